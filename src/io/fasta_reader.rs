// FASTA reader for reference sequences, wrapping bio::io::fasta.

use bio::io::fasta;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::open_input;

/// FASTA reader with gzip detection by extension
pub struct FastaReader {
    records: fasta::Records<BufReader<Box<dyn Read>>>,
}

impl FastaReader {
    /// Open a FASTA file (.fa, .fasta, optionally .gz)
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let reader = open_input(path.as_ref())?;
        Ok(Self {
            records: fasta::Reader::new(reader).records(),
        })
    }

    /// Read the next FASTA record
    ///
    /// Returns `Ok(Some(record))` if a record is found, `Ok(None)` at EOF,
    /// and `Err(e)` on a parse error.
    pub fn read_record(&mut self) -> io::Result<Option<fasta::Record>> {
        match self.records.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }
}
