use std::cmp::Ordering;
use std::io;
use std::path::Path;

use bio::data_structures::suffix_array::suffix_array;

use super::SeedIndex;
use crate::cache::key::nt4;
use crate::io::fasta_reader::FastaReader;

/// Text symbol separating contigs; sorts after every base so no seed spans it.
const SEPARATOR: u8 = 5;

/// A named reference sequence and where it starts in the concatenated text.
#[derive(Debug, Clone)]
pub struct Contig {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

/// Plain suffix array over the concatenated reference.
///
/// Text symbols are the 2-bit codes shifted up by one (A=1 .. T=4), ambiguous
/// bases and contig boundaries become 5, and a 0 sentinel closes the text.
pub struct SuffixArrayIndex {
    text: Vec<u8>,
    sa: Vec<usize>,
    contigs: Vec<Contig>,
}

impl SuffixArrayIndex {
    /// Index a set of `(name, ascii sequence)` records.
    pub fn build<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut text = Vec::new();
        let mut contigs = Vec::new();
        for (name, seq) in records {
            if !text.is_empty() {
                text.push(SEPARATOR);
            }
            contigs.push(Contig {
                name: name.to_string(),
                offset: text.len(),
                len: seq.len(),
            });
            text.extend(seq.iter().map(|&b| nt4(b) + 1));
        }
        text.push(0);

        let sa = suffix_array(&text);
        log::debug!(
            "Built suffix array over {} contigs, {} bp",
            contigs.len(),
            text.len() - 1
        );
        Self { text, sa, contigs }
    }

    /// Index every record of a (possibly gzipped) FASTA file.
    pub fn from_fasta<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut reader = FastaReader::new(path)?;
        let mut records = Vec::new();
        while let Some(record) = reader.read_record()? {
            records.push((record.id().to_string(), record.seq().to_vec()));
        }
        if records.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "reference has no sequences",
            ));
        }
        Ok(Self::build(
            records.iter().map(|(n, s)| (n.as_str(), s.as_slice())),
        ))
    }

    /// Number of suffix-array rows, sentinel included.
    pub fn len(&self) -> usize {
        self.sa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sa.len() <= 1
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    /// Contig holding text offset `off` and the position inside it.
    pub fn locate(&self, off: u32) -> Option<(&Contig, usize)> {
        let off = off as usize;
        let idx = self.contigs.partition_point(|c| c.offset <= off);
        let contig = self.contigs.get(idx.checked_sub(1)?)?;
        (off < contig.offset + contig.len).then(|| (contig, off - contig.offset))
    }

    /// Compare the suffix at `pos` against `pat`, looking at no more than
    /// `pat.len()` symbols. A suffix that ends early sorts first.
    fn cmp_prefix(&self, pos: usize, pat: &[u8]) -> Ordering {
        let suffix = &self.text[pos..];
        for (i, &p) in pat.iter().enumerate() {
            match suffix.get(i) {
                None => return Ordering::Less,
                Some(&s) => match s.cmp(&(p + 1)) {
                    Ordering::Equal => {}
                    ord => return ord,
                },
            }
        }
        Ordering::Equal
    }
}

impl SeedIndex for SuffixArrayIndex {
    fn sa_range(&self, codes: &[u8]) -> Option<(u32, u32)> {
        if codes.is_empty() || codes.iter().any(|&c| c > 3) {
            return None;
        }
        let top = self
            .sa
            .partition_point(|&p| self.cmp_prefix(p, codes) == Ordering::Less);
        let bot = self
            .sa
            .partition_point(|&p| self.cmp_prefix(p, codes) != Ordering::Greater);
        (top < bot).then_some((top as u32, bot as u32))
    }

    fn sa_offset(&self, row: u32) -> u32 {
        self.sa[row as usize] as u32
    }
}
