//! Fixed-budget page pool backing every structure of one alignment cache.
//!
//! The pool only accounts for pages; the containers drawing from it keep
//! their own typed page storage. A pool never grows: once
//! `total_bytes / page_size` pages are handed out, `allocate_page` fails until
//! the next `reset`.

/// Default page size in bytes (16 KiB).
pub const CACHE_PAGE_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct Pool {
    page_size: usize,
    num_pages: usize,
    used: usize,
}

impl Pool {
    /// Create a pool with a budget of `total_bytes`, rounded down to whole pages.
    pub fn new(total_bytes: u64, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let num_pages = (total_bytes / page_size as u64) as usize;
        Self {
            page_size,
            num_pages,
            used: 0,
        }
    }

    /// Hand out the next page ordinal, or `None` once the budget is spent.
    #[inline]
    pub fn allocate_page(&mut self) -> Option<usize> {
        if self.used == self.num_pages {
            return None;
        }
        let page = self.used;
        self.used += 1;
        Some(page)
    }

    /// Return every page to the pool. Everything allocated so far is invalid.
    #[inline]
    pub fn reset(&mut self) {
        self.used = 0;
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    #[inline]
    pub fn pages_used(&self) -> usize {
        self.used
    }

    pub fn bytes_used(&self) -> u64 {
        (self.used * self.page_size) as u64
    }

    pub fn capacity_bytes(&self) -> u64 {
        (self.num_pages * self.page_size) as u64
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.used == self.num_pages
    }
}
