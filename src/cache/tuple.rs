//! Query-result records and uniform random down-sampling of result rows.

use rand::Rng;

use super::key::SAKey;
use crate::core::plist::PagedListSlice;

/// Offsets of one reference substring inside a cache's element list.
pub type OffsetSlice<'a> = PagedListSlice<'a, u32>;

/// Everything cached about one reference substring associated with a seed.
///
/// Borrows the cache it came from, so it cannot outlive a clear.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SATuple<'a> {
    pub key: SAKey,
    /// Top of the BWT range; the bottom is `top + offs.len()`.
    pub top: u32,
    pub offs: OffsetSlice<'a>,
}

impl<'a> SATuple<'a> {
    pub fn new(key: SAKey, top: u32, offs: OffsetSlice<'a>) -> Self {
        Self { key, top, offs }
    }

    /// Rows `[first, last)` of `self`.
    pub fn narrow(&self, first: usize, last: usize) -> Self {
        Self {
            key: self.key,
            top: self.top + first as u32,
            offs: self.offs.narrow(first, last),
        }
    }

    /// Number of rows (suffix-array elements) covered.
    #[inline]
    pub fn rows(&self) -> usize {
        self.offs.len()
    }

    /// Bottom of the BWT range (exclusive).
    #[inline]
    pub fn bot(&self) -> u32 {
        self.top + self.offs.len() as u32
    }

    /// Keep a uniformly placed window of exactly `maxrows` rows out of the
    /// concatenation of every tuple in `src`, wrapping around the end.
    ///
    /// Tuples are split at the window boundaries, so `dst` receives between 1
    /// and `src.len() + 1` tuples (one source tuple may be touched at both the
    /// start and the end of a wrapped window). Returns false and leaves `dst`
    /// untouched when `src` already has at most `maxrows` rows.
    pub fn random_narrow<R: Rng>(
        src: &[SATuple<'a>],
        dst: &mut Vec<SATuple<'a>>,
        rng: &mut R,
        maxrows: usize,
    ) -> bool {
        let total: usize = src.iter().map(|t| t.rows()).sum();
        if total <= maxrows {
            return false;
        }
        let start_row = rng.gen_range(0..total);
        let first_dst = dst.len();

        let mut sampled = 0usize;
        let mut seen = 0usize;
        let mut on = false;
        // Two passes: the window may wrap past the last tuple.
        'outer: for _ in 0..2 {
            for tup in src {
                let size = tup.rows();
                if !on {
                    on = start_row < seen + size;
                    if on {
                        let first = start_row - seen;
                        let last = (first + maxrows).min(size);
                        dst.push(tup.narrow(first, last));
                        sampled += last - first;
                    }
                } else {
                    let last = (maxrows - sampled).min(size);
                    if last > 0 {
                        dst.push(tup.narrow(0, last));
                        sampled += last;
                    }
                }
                if sampled == maxrows {
                    break 'outer;
                }
                seen += size;
            }
            debug_assert!(on);
        }

        debug_assert_eq!(sampled, maxrows);
        debug_assert!(dst.len() > first_dst);
        debug_assert!(dst.len() - first_dst <= src.len() + 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plist::PagedList;
    use crate::core::pool::Pool;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn element_list(n: u32) -> PagedList<u32> {
        let mut pool = Pool::new(1 << 16, 1024);
        let mut list = PagedList::new(1024);
        for i in 0..n {
            list.add(&mut pool, 1000 + i).unwrap();
        }
        list
    }

    fn tuples<'a>(list: &'a PagedList<u32>, sizes: &[usize]) -> Vec<SATuple<'a>> {
        let mut start = 0;
        sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let t = SATuple::new(
                    SAKey::from_packed(i as u64, 8),
                    (start * 10) as u32,
                    list.slice(start, len),
                );
                start += len;
                t
            })
            .collect()
    }

    #[test]
    fn test_narrow_advances_top() {
        let list = element_list(10);
        let t = SATuple::new(SAKey::from_ascii(b"ACGT"), 50, list.slice(2, 6));
        let n = t.narrow(1, 4);
        assert_eq!(n.top, 51);
        assert_eq!(n.bot(), 54);
        assert_eq!(n.offs.to_vec(), vec![1003, 1004, 1005]);
    }

    #[test]
    fn test_random_narrow_noop_when_small() {
        let list = element_list(10);
        let src = tuples(&list, &[3, 4]);
        let mut dst = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!SATuple::random_narrow(&src, &mut dst, &mut rng, 7));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_random_narrow_exact_row_count() {
        let list = element_list(100);
        let src = tuples(&list, &[10, 1, 30, 7, 2, 50]);
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        for maxrows in [1usize, 5, 17, 50, 99] {
            for _ in 0..50 {
                let mut dst = Vec::new();
                assert!(SATuple::random_narrow(&src, &mut dst, &mut rng, maxrows));
                let rows: usize = dst.iter().map(|t| t.rows()).sum();
                assert_eq!(rows, maxrows);
                assert!(!dst.is_empty());
                assert!(dst.len() <= src.len() + 1);
                assert!(dst.iter().all(|t| t.rows() > 0));
            }
        }
    }

    #[test]
    fn test_random_narrow_window_is_contiguous() {
        let list = element_list(20);
        let src = tuples(&list, &[5, 5, 5, 5]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let mut dst = Vec::new();
            SATuple::random_narrow(&src, &mut dst, &mut rng, 12);
            // Elements are 1000..1020 in order; a wrapped window restarts at 1000.
            let flat: Vec<u32> = dst.iter().flat_map(|t| t.offs.iter()).collect();
            for w in flat.windows(2) {
                assert!(w[1] == w[0] + 1 || (w[0] == 1019 && w[1] == 1000));
            }
        }
    }

    #[test]
    fn test_random_narrow_single_tuple_wraps() {
        let list = element_list(10);
        let src = tuples(&list, &[10]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut saw_split = false;
        for _ in 0..200 {
            let mut dst = Vec::new();
            SATuple::random_narrow(&src, &mut dst, &mut rng, 6);
            assert!(dst.len() <= 2);
            saw_split |= dst.len() == 2;
        }
        assert!(saw_split);
    }
}
