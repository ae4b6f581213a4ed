// Exact-match seeding through the cache hierarchy.
//
// Each read is cut into fixed-length seeds on both strands. A seed already
// aligned in any tier is answered from the cache; otherwise the index is
// searched and the result recorded so later reads sharing the seed skip the
// search.

use std::ops::AddAssign;

use rand::Rng;

use crate::cache::iface::{AlignmentCacheIface, BeginAlign};
use crate::cache::key::{INVALID, QKey, QVal, encode_ascii, reverse_complement};
use crate::cache::tuple::SATuple;
use crate::cache_opt::CacheOpt;
use crate::index::SeedIndex;

/// One reference occurrence of one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHit {
    pub query_pos: u32, // Seed start on the forward read
    pub is_rev: bool,   // Seed taken from the reverse complement
    pub ref_pos: u32,   // Offset in the concatenated reference
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedStats {
    pub seeds: u64,
    pub hits: u64,        // Answered from a cache tier
    pub misses: u64,      // Searched in the index and recorded
    pub uncacheable: u64, // Too long or ambiguous to cache
    pub ooms: u64,        // Searched without caching for lack of memory
    pub rows: u64,        // Reference occurrences reported
}

impl AddAssign for SeedStats {
    fn add_assign(&mut self, o: Self) {
        self.seeds += o.seeds;
        self.hits += o.hits;
        self.misses += o.misses;
        self.uncacheable += o.uncacheable;
        self.ooms += o.ooms;
        self.rows += o.rows;
    }
}

#[derive(Debug, Default)]
pub struct ReadSeedResult {
    pub hits: Vec<SeedHit>,
    pub stats: SeedStats,
}

/// Where a seed's suffix-array rows come from.
enum SeedRows {
    Cached(QVal),
    Direct(Option<(u32, u32)>),
}

pub struct SeedSearcher {
    seed_len: usize,
    seed_interval: usize,
    max_rows: usize,
    both_strands: bool,
}

impl SeedSearcher {
    pub fn new(opt: &CacheOpt) -> Self {
        Self {
            seed_len: opt.seed_len,
            seed_interval: opt.seed_interval.max(1),
            max_rows: opt.max_rows,
            both_strands: opt.both_strands,
        }
    }

    /// Seed one read (ASCII bases) and turn the current-read cache over.
    pub fn search_read<I, R>(
        &self,
        iface: &mut AlignmentCacheIface<'_>,
        index: &I,
        read: &[u8],
        rng: &mut R,
    ) -> ReadSeedResult
    where
        I: SeedIndex + ?Sized,
        R: Rng,
    {
        let mut res = ReadSeedResult::default();
        let fw = encode_ascii(read);
        if self.seed_len > 0 && fw.len() >= self.seed_len {
            self.search_strand(iface, index, &fw, false, rng, &mut res);
            if self.both_strands {
                let rc = reverse_complement(&fw);
                self.search_strand(iface, index, &rc, true, rng, &mut res);
            }
        }
        iface.next_read();
        res
    }

    fn search_strand<I, R>(
        &self,
        iface: &mut AlignmentCacheIface<'_>,
        index: &I,
        codes: &[u8],
        is_rev: bool,
        rng: &mut R,
        res: &mut ReadSeedResult,
    ) where
        I: SeedIndex + ?Sized,
        R: Rng,
    {
        let len = codes.len();
        for pos in (0..=len - self.seed_len).step_by(self.seed_interval) {
            let seed = &codes[pos..pos + self.seed_len];
            let query_pos = if is_rev { len - pos - self.seed_len } else { pos };
            res.stats.seeds += 1;

            let rows = self.seed_rows(iface, index, seed, &mut res.stats);
            let before = res.hits.len();
            match rows {
                SeedRows::Cached(qv) => {
                    self.report_cached(iface, index, &qv, query_pos as u32, is_rev, rng, &mut res.hits)
                }
                SeedRows::Direct(Some((top, bot))) => {
                    self.report_direct(index, top, bot, query_pos as u32, is_rev, rng, &mut res.hits)
                }
                SeedRows::Direct(None) => {}
            }
            res.stats.rows += (res.hits.len() - before) as u64;
        }
    }

    fn seed_rows<I: SeedIndex + ?Sized>(
        &self,
        iface: &mut AlignmentCacheIface<'_>,
        index: &I,
        seed: &[u8],
        stats: &mut SeedStats,
    ) -> SeedRows {
        let qk = QKey::new(seed);
        if !qk.cacheable() {
            stats.uncacheable += 1;
            return SeedRows::Direct(index.sa_range(seed));
        }
        // Pull a hit from the local or shared tier down into the current one.
        iface.query_copy(&qk);

        match iface.begin_align(seed) {
            BeginAlign::Found(qv) => {
                stats.hits += 1;
                SeedRows::Cached(qv)
            }
            BeginAlign::OutOfMemory => {
                stats.ooms += 1;
                SeedRows::Direct(index.sa_range(seed))
            }
            BeginAlign::Searching => {
                let range = index.sa_range(seed);
                if let Some((top, bot)) = range {
                    if let Err(e) = iface.add_on_the_fly(seed, top, bot) {
                        // The interface has already dropped the seed
                        log::trace!("Seed {} not cached: {}", qk, e);
                        stats.ooms += 1;
                        return SeedRows::Direct(range);
                    }
                }
                match iface.finish_align() {
                    Ok(qv) => {
                        stats.misses += 1;
                        SeedRows::Cached(qv)
                    }
                    Err(e) => {
                        log::trace!("Seed {} not cached: {}", qk, e);
                        stats.ooms += 1;
                        SeedRows::Direct(range)
                    }
                }
            }
        }
    }

    /// Report the rows of `qv`, resolving placeholder elements through the
    /// index and writing the offsets back into the cache.
    #[allow(clippy::too_many_arguments)]
    fn report_cached<I: SeedIndex + ?Sized, R: Rng>(
        &self,
        iface: &mut AlignmentCacheIface<'_>,
        index: &I,
        qv: &QVal,
        query_pos: u32,
        is_rev: bool,
        rng: &mut R,
        hits: &mut Vec<SeedHit>,
    ) {
        // (top, first element index, rows) of every tuple to report
        let spans: Vec<(u32, usize, usize)> = {
            let mut tups = Vec::new();
            if let Err(e) = iface.query_qval(qv, &mut tups) {
                log::warn!("Cached seed lost its reference entries: {}", e);
                return;
            }
            let mut narrowed = Vec::new();
            if self.max_rows > 0
                && SATuple::random_narrow(&tups, &mut narrowed, rng, self.max_rows)
            {
                tups = narrowed;
            }
            tups.iter()
                .map(|t| (t.top, t.offs.start(), t.rows()))
                .collect()
        };

        let store = iface.current_mut();
        for (top, start, rows) in spans {
            for j in 0..rows {
                let mut off = store.element(start + j);
                if off == INVALID {
                    off = index.sa_offset(top + j as u32);
                    store.set_element(start + j, off);
                }
                hits.push(SeedHit {
                    query_pos,
                    is_rev,
                    ref_pos: off,
                });
            }
        }
    }

    /// Report rows `[top, bot)` straight from the index, keeping a random
    /// window of `max_rows` rows (wrapping around) when there are more.
    #[allow(clippy::too_many_arguments)]
    fn report_direct<I: SeedIndex + ?Sized, R: Rng>(
        &self,
        index: &I,
        top: u32,
        bot: u32,
        query_pos: u32,
        is_rev: bool,
        rng: &mut R,
        hits: &mut Vec<SeedHit>,
    ) {
        let n = bot - top;
        let (first, take) = if self.max_rows > 0 && n as usize > self.max_rows {
            (rng.gen_range(0..n), self.max_rows as u32)
        } else {
            (0, n)
        };
        for k in 0..take {
            let row = top + (first + k) % n;
            hits.push(SeedHit {
                query_pos,
                is_rev,
                ref_pos: index.sa_offset(row),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::alignment_cache::CacheStore;
    use crate::index::SuffixArrayIndex;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const REF: &[u8] = b"ACGTTGCATGCAAACCCGGGTTTACGTAGGCTAGCTAGGATCCGATCGGATCGATTAGC";

    fn opt(seed_len: usize, max_rows: usize) -> CacheOpt {
        CacheOpt {
            seed_len,
            seed_interval: 4,
            max_rows,
            both_strands: false,
            ..CacheOpt::default()
        }
    }

    #[test]
    fn test_exact_read_hits_its_origin() {
        let index = SuffixArrayIndex::build([("chr1", REF)]);
        let searcher = SeedSearcher::new(&opt(8, 0));
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        let mut rng = StdRng::seed_from_u64(1);

        let read = &REF[10..30];
        let res = searcher.search_read(&mut iface, &index, read, &mut rng);
        assert_eq!(res.stats.seeds, 4);
        assert_eq!(res.stats.misses, 4);
        for pos in [0u32, 4, 8, 12] {
            assert!(res.hits.contains(&SeedHit {
                query_pos: pos,
                is_rev: false,
                ref_pos: 10 + pos,
            }));
        }
        assert!(!iface.aligning());
        assert!(iface.current().is_empty());
    }

    #[test]
    fn test_repeat_seed_within_read_is_a_hit() {
        let index = SuffixArrayIndex::build([("chr1", &b"GATTACAGATTACAGATTACA"[..])]);
        let searcher = SeedSearcher::new(&CacheOpt {
            seed_interval: 7,
            ..opt(7, 0)
        });
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        let mut rng = StdRng::seed_from_u64(1);

        let res = searcher.search_read(&mut iface, &index, b"GATTACAGATTACA", &mut rng);
        assert_eq!(res.stats.seeds, 2);
        assert_eq!(res.stats.misses, 1);
        assert_eq!(res.stats.hits, 1);
        assert_eq!(res.stats.rows, 6);
    }

    #[test]
    fn test_row_cap_applies_to_cached_and_direct() {
        let index = SuffixArrayIndex::build([("chr1", &[b'A'; 64][..])]);
        let searcher = SeedSearcher::new(&opt(8, 5));
        let mut rng = StdRng::seed_from_u64(9);

        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        let res = searcher.search_read(&mut iface, &index, &[b'A'; 8], &mut rng);
        assert_eq!(res.stats.misses, 1);
        assert_eq!(res.hits.len(), 5);

        let mut tiny = CacheStore::new(0, 1024);
        let mut iface = AlignmentCacheIface::new(&mut tiny, None, None);
        let res = searcher.search_read(&mut iface, &index, &[b'A'; 8], &mut rng);
        assert_eq!(res.stats.ooms, 1);
        assert_eq!(res.hits.len(), 5);
    }

    #[test]
    fn test_ambiguous_seed_and_short_read() {
        let index = SuffixArrayIndex::build([("chr1", REF)]);
        let searcher = SeedSearcher::new(&opt(8, 0));
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        let mut rng = StdRng::seed_from_u64(1);

        let res = searcher.search_read(&mut iface, &index, b"ACGTNGCA", &mut rng);
        assert_eq!(res.stats.uncacheable, 1);
        assert!(res.hits.is_empty());

        let res = searcher.search_read(&mut iface, &index, b"ACG", &mut rng);
        assert_eq!(res.stats, SeedStats::default());
    }

    #[test]
    fn test_reverse_strand_positions() {
        let index = SuffixArrayIndex::build([("chr1", REF)]);
        let searcher = SeedSearcher::new(&CacheOpt {
            both_strands: true,
            ..opt(8, 0)
        });
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        let mut rng = StdRng::seed_from_u64(1);

        // Reverse complement of REF[20..32]
        let rc: Vec<u8> = REF[20..32]
            .iter()
            .rev()
            .map(|&b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                _ => b'A',
            })
            .collect();
        let res = searcher.search_read(&mut iface, &index, &rc, &mut rng);
        assert!(res.hits.contains(&SeedHit {
            query_pos: 4,
            is_rev: true,
            ref_pos: 20,
        }));
    }
}
