//! Append-only paged list drawing its pages from a [`Pool`], plus a
//! zero-copy slice view over it.
//!
//! Indices handed out by `add` are stable until `clear`. Clearing is O(1):
//! physical pages are retained and refilled as the list grows again, but
//! every page in use must first be granted by the pool, so the live contents
//! never exceed the pool's budget.

use std::fmt;

use super::pool::Pool;
use crate::error::{CacheError, CacheResult};

pub struct PagedList<T: Copy> {
    pages: Vec<Vec<T>>,
    live_pages: usize,
    per_page: usize,
    len: usize,
}

impl<T: Copy> PagedList<T> {
    /// Create an empty list whose pages hold `page_size` bytes of elements.
    pub fn new(page_size: usize) -> Self {
        let elem = std::mem::size_of::<T>().max(1);
        Self {
            pages: Vec::new(),
            live_pages: 0,
            per_page: (page_size / elem).max(1),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements per page.
    #[inline]
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.live_pages * self.per_page
    }

    /// Bring one more page into use, reusing a retained buffer when possible.
    fn grow(&mut self, pool: &mut Pool) -> CacheResult<()> {
        pool.allocate_page().ok_or(CacheError::PoolExhausted)?;
        if self.live_pages == self.pages.len() {
            self.pages.push(Vec::with_capacity(self.per_page));
        } else {
            self.pages[self.live_pages].clear();
        }
        self.live_pages += 1;
        Ok(())
    }

    /// Append `item`, returning its index.
    pub fn add(&mut self, pool: &mut Pool, item: T) -> CacheResult<usize> {
        if self.len == self.capacity() {
            self.grow(pool)?;
        }
        Ok(self.add_reserved(item))
    }

    /// Append into space previously secured with [`reserve`](Self::reserve).
    pub fn add_reserved(&mut self, item: T) -> usize {
        assert!(self.len < self.capacity(), "add_reserved without reserved space");
        let idx = self.len;
        self.pages[idx / self.per_page].push(item);
        self.len += 1;
        idx
    }

    /// Make sure the next `additional` calls to `add` cannot fail.
    pub fn reserve(&mut self, pool: &mut Pool, additional: usize) -> CacheResult<()> {
        while self.capacity() - self.len < additional {
            self.grow(pool)?;
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, idx: usize) -> T {
        assert!(idx < self.len, "index {} out of bounds ({})", idx, self.len);
        self.pages[idx / self.per_page][idx % self.per_page]
    }

    #[inline]
    pub fn get_ref(&self, idx: usize) -> &T {
        assert!(idx < self.len, "index {} out of bounds ({})", idx, self.len);
        &self.pages[idx / self.per_page][idx % self.per_page]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        assert!(idx < self.len, "index {} out of bounds ({})", idx, self.len);
        &mut self.pages[idx / self.per_page][idx % self.per_page]
    }

    #[inline]
    pub fn set(&mut self, idx: usize, item: T) {
        *self.get_mut(idx) = item;
    }

    pub fn back(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.get(self.len - 1))
        }
    }

    /// Forget every element. The pool must be reset alongside.
    #[inline]
    /// Drop elements from the back until `len` remain. Pages stay charged to
    /// the pool until the next [`clear`](Self::clear).
    pub fn truncate(&mut self, len: usize) {
        while self.len > len {
            self.len -= 1;
            self.pages[self.len / self.per_page].pop();
        }
    }

    pub fn clear(&mut self) {
        self.live_pages = 0;
        self.len = 0;
    }

    pub fn slice(&self, start: usize, len: usize) -> PagedListSlice<'_, T> {
        PagedListSlice::new(self, start, len)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

/// View of `len` consecutive elements of a [`PagedList`] starting at `start`.
#[derive(Clone, Copy)]
pub struct PagedListSlice<'a, T: Copy> {
    list: &'a PagedList<T>,
    start: usize,
    len: usize,
}

impl<'a, T: Copy> PagedListSlice<'a, T> {
    pub fn new(list: &'a PagedList<T>, start: usize, len: usize) -> Self {
        assert!(
            start + len <= list.len(),
            "slice [{}, {}) exceeds list of {}",
            start,
            start + len,
            list.len()
        );
        Self { list, start, len }
    }

    /// Sub-slice covering `[first, last)` of this slice. No payload is copied.
    pub fn narrow(&self, first: usize, last: usize) -> Self {
        assert!(first <= last && last <= self.len);
        Self {
            list: self.list,
            start: self.start + first,
            len: last - first,
        }
    }

    /// Index of the first element in the backing list.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> T {
        assert!(i < self.len);
        self.list.get(self.start + i)
    }

    pub fn iter(self) -> impl Iterator<Item = T> + 'a {
        let list = self.list;
        (self.start..self.start + self.len).map(move |i| list.get(i))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Copy + PartialEq> PartialEq for PagedListSlice<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for PagedListSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
