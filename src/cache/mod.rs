//! Seed-alignment result cache.
//!
//! Maps a seed ([`key::QKey`]) to the reference substrings it aligned to and,
//! for each of those, its suffix-array range and reference offsets. Caches are
//! stacked in three tiers (current read, per-thread, shared) behind
//! [`iface::AlignmentCacheIface`].

pub mod alignment_cache;
pub mod iface;
pub mod key;
pub mod tuple;

pub use alignment_cache::{AlignmentCache, CacheStore, QValHandle};
pub use iface::{AlignmentCacheIface, BeginAlign, CacheTier};
pub use key::{QKey, QVal, SAKey, SAVal};
pub use tuple::SATuple;
