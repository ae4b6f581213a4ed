//! Sequence file readers built on `bio::io`, with transparent gzip input.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

pub mod fasta_reader;
pub mod fastq_reader;

const BUFFER_SIZE: usize = 4 * 1024 * 1024; // 4MB buffer

/// Open `path` for buffered reading, decompressing when it ends in `.gz`.
pub(crate) fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let gzipped = path.extension().is_some_and(|ext| ext == "gz");
    if gzipped {
        log::debug!("Reading {} through gzip", path.display());
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}
