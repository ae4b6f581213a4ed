use clap::Args;

use crate::core::pool::CACHE_PAGE_SIZE;

/// Default values for the cache tiers and the seed driver.
pub mod defaults {
    pub const CURRENT_CACHE_BYTES: u64 = 16 * 1024 * 1024;
    pub const LOCAL_CACHE_BYTES: u64 = 32 * 1024 * 1024;
    pub const SHARED_CACHE_BYTES: u64 = 256 * 1024 * 1024;
    pub const SEED_LEN: usize = 22;
    pub const SEED_INTERVAL: usize = 10;
    pub const MAX_ROWS: usize = 200;
    pub const RNG_SEED: u64 = 0;
    pub const BATCH_SIZE: usize = 512;
}

/// Cache hierarchy and seeding options.
#[derive(Debug, Clone)]
pub struct CacheOpt {
    // Tier budgets (0 disables the local/shared tier)
    pub current_bytes: u64, // Current-read cache
    pub local_bytes: u64,   // Per-worker cache kept across reads
    pub shared_bytes: u64,  // Process-wide cache
    pub page_size: usize,   // Pool page size in bytes

    // Seeding
    pub seed_len: usize,      // Seed length in bases (at most 32 to be cacheable)
    pub seed_interval: usize, // Distance between seed starts
    pub max_rows: usize,      // Report at most this many SA rows per seed (0 = all)
    pub both_strands: bool,   // Also seed the reverse complement

    // Processing
    pub rng_seed: u64,
    pub batch_size: usize, // Reads per batch
    pub n_threads: usize,
}

impl Default for CacheOpt {
    fn default() -> Self {
        Self {
            current_bytes: defaults::CURRENT_CACHE_BYTES,
            local_bytes: defaults::LOCAL_CACHE_BYTES,
            shared_bytes: defaults::SHARED_CACHE_BYTES,
            page_size: CACHE_PAGE_SIZE,
            seed_len: defaults::SEED_LEN,
            seed_interval: defaults::SEED_INTERVAL,
            max_rows: defaults::MAX_ROWS,
            both_strands: true,
            rng_seed: defaults::RNG_SEED,
            batch_size: defaults::BATCH_SIZE,
            n_threads: 1,
        }
    }
}

impl CacheOpt {
    pub fn local_enabled(&self) -> bool {
        self.local_bytes > 0
    }

    pub fn shared_enabled(&self) -> bool {
        self.shared_bytes > 0
    }
}

#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    /// Current-read cache size in MB
    #[arg(long, value_name = "MB", default_value_t = defaults::CURRENT_CACHE_BYTES >> 20)]
    pub current_cache_mb: u64,

    /// Per-thread cache size in MB (0 disables)
    #[arg(long, value_name = "MB", default_value_t = defaults::LOCAL_CACHE_BYTES >> 20)]
    pub local_cache_mb: u64,

    /// Cache size in MB shared by all threads (0 disables)
    #[arg(long, value_name = "MB", default_value_t = defaults::SHARED_CACHE_BYTES >> 20)]
    pub shared_cache_mb: u64,

    /// Seed length
    #[arg(short = 'L', long, value_name = "INT", default_value_t = defaults::SEED_LEN)]
    pub seed_len: usize,

    /// Interval between seed offsets
    #[arg(short = 'i', long, value_name = "INT", default_value_t = defaults::SEED_INTERVAL)]
    pub seed_interval: usize,

    /// Down-sample seeds with more than INT suffix-array rows (0 keeps all)
    #[arg(long, value_name = "INT", default_value_t = defaults::MAX_ROWS)]
    pub max_rows: usize,

    /// Seed the forward strand only
    #[arg(long)]
    pub forward_only: bool,

    /// Random seed for down-sampling
    #[arg(long, value_name = "INT", default_value_t = defaults::RNG_SEED)]
    pub seed: u64,

    /// Reads per batch
    #[arg(short = 'K', long, value_name = "INT", default_value_t = defaults::BATCH_SIZE)]
    pub batch_size: usize,
}

impl CacheArgs {
    pub fn to_opt(&self, n_threads: usize) -> CacheOpt {
        CacheOpt {
            current_bytes: self.current_cache_mb << 20,
            local_bytes: self.local_cache_mb << 20,
            shared_bytes: self.shared_cache_mb << 20,
            seed_len: self.seed_len,
            seed_interval: self.seed_interval.max(1),
            max_rows: self.max_rows,
            both_strands: !self.forward_only,
            rng_seed: self.seed,
            batch_size: self.batch_size.max(1),
            n_threads,
            ..CacheOpt::default()
        }
    }
}
