// FASTQ reader for query reads, wrapping bio::io::fastq.
//
// Reads are pulled in batches so a batch can be handed to the worker pool
// in one piece.

use bio::io::fastq;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::open_input;

/// Batch of FASTQ reads
#[derive(Debug, Default)]
pub struct ReadBatch {
    pub names: Vec<String>,
    pub seqs: Vec<Vec<u8>>,
}

impl ReadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reads in this batch
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(name, sequence)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.names
            .iter()
            .zip(&self.seqs)
            .map(|(n, s)| (n.as_str(), s.as_slice()))
    }
}

/// FASTQ reader with gzip detection by extension
pub struct FastqReader {
    records: fastq::Records<BufReader<Box<dyn Read>>>,
}

impl FastqReader {
    /// Open a FASTQ file (.fq, .fastq, optionally .gz)
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let reader = open_input(path.as_ref())?;
        Ok(Self {
            records: fastq::Reader::new(reader).records(),
        })
    }

    /// Read up to `batch_size` reads. Returns an empty batch at EOF.
    pub fn read_batch(&mut self, batch_size: usize) -> io::Result<ReadBatch> {
        let mut batch = ReadBatch::new();

        for _ in 0..batch_size {
            match self.records.next() {
                Some(Ok(record)) => {
                    batch.names.push(record.id().to_string());
                    batch.seqs.push(record.seq().to_vec());
                }
                Some(Err(e)) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
                None => break,
            }
        }

        Ok(batch)
    }
}
