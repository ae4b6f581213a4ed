//! Fixed-budget memory for the caches: a page accountant, paged lists drawn
//! from it, and an ordered map whose nodes live in those lists.

pub mod arena_map;
pub mod plist;
pub mod pool;
