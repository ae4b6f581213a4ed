pub mod cache;
pub mod cache_opt;
pub mod core;
pub mod error;
pub mod index; // Suffix-array index behind the SeedIndex trait
pub mod io; // FASTA/FASTQ readers using bio::io
pub mod replay; // Multi-threaded batch driver
pub mod seeding; // Fixed-length seeding through the cache tiers

pub use cache::{AlignmentCache, AlignmentCacheIface, CacheStore};
pub use cache_opt::CacheOpt;
pub use error::{CacheError, CacheResult};
