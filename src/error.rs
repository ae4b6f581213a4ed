//! Error type for the seed cache.
//!
//! Arena exhaustion is the only failure the cache structures themselves
//! produce. It is an ordinary value that callers handle by skipping the
//! cache for one seed (or by turning over a tier), never a panic.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// The owning pool has handed out every page of its byte budget.
    #[error("cache pool exhausted")]
    PoolExhausted,

    /// A QVal handle outlived a clear of the cache that issued it.
    #[error("stale cache handle (issued at version {handle}, cache is at version {current})")]
    StaleHandle { handle: u32, current: u32 },

    /// The key is longer than 32 bases or contains an ambiguous base.
    #[error("key is not cacheable")]
    Uncacheable,

    /// `add_on_the_fly` was called outside `begin_align`/`finish_align`.
    #[error("no seed alignment in progress")]
    NotAligning,

    /// A QVal's reference range is no longer at the end of the list, so it
    /// cannot be extended in place.
    #[error("seed's reference range is not at the end of the list")]
    RangeNotAtTail,

    /// A reference-substring key has no suffix-array entry.
    #[error("reference substring has no suffix-array entry")]
    MissingSaEntry,
}

pub type CacheResult<T> = Result<T, CacheError>;
