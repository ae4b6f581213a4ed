//! Per-worker front end over the cache hierarchy.
//!
//! A worker aligns one read at a time. For each seed it calls
//! [`begin_align`](AlignmentCacheIface::begin_align); on a miss it reports
//! every reference substring the index search finds through
//! [`add_on_the_fly`](AlignmentCacheIface::add_on_the_fly) and closes the
//! seed with [`finish_align`](AlignmentCacheIface::finish_align), which
//! promotes the result to the next tier up. Between reads it calls
//! [`next_read`](AlignmentCacheIface::next_read).
//!
//! Tiers, highest priority first:
//! 1. current-read cache: owned by the worker, turned over every read
//! 2. local cache: owned by the worker, survives across reads (optional)
//! 3. shared cache: one per process behind a mutex (optional)

use std::sync::Arc;

use super::alignment_cache::{AlignmentCache, CacheStore, QValHandle};
use super::key::{QKey, QVal, SAKey};
use super::tuple::SATuple;
use crate::error::{CacheError, CacheResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheTier {
    Current,
    Local,
    Shared,
}

/// Outcome of [`AlignmentCacheIface::begin_align`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginAlign {
    /// The current-read cache could not make room for the seed; search it
    /// without caching.
    OutOfMemory,
    /// The seed was already aligned during this read.
    Found(QVal),
    /// A slot is ready; report associations, then call `finish_align`.
    Searching,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InProgress {
    Idle,
    Cached(QValHandle),
    /// Seed is uncacheable; associations accumulate in `scratch`.
    Scratch,
}

pub struct AlignmentCacheIface<'c> {
    qk: QKey,
    state: InProgress,
    scratch: QVal,
    rangen: usize,
    eltsn: usize,
    current: &'c mut CacheStore,
    local: Option<&'c mut CacheStore>,
    shared: Option<Arc<AlignmentCache>>,
}

impl<'c> AlignmentCacheIface<'c> {
    pub fn new(
        current: &'c mut CacheStore,
        local: Option<&'c mut CacheStore>,
        shared: Option<Arc<AlignmentCache>>,
    ) -> Self {
        Self {
            qk: QKey::default(),
            state: InProgress::Idle,
            scratch: QVal::default(),
            rangen: 0,
            eltsn: 0,
            current,
            local,
            shared,
        }
    }

    /// Start aligning the seed `seq` (2-bit codes).
    pub fn begin_align(&mut self, seq: &[u8]) -> BeginAlign {
        debug_assert!(!self.aligning(), "begin_align while a seed is in progress");
        self.qk.init(seq);
        if !self.qk.cacheable() {
            self.scratch.reset();
            self.state = InProgress::Scratch;
            return BeginAlign::Searching;
        }

        if let Some(qv) = self.current.lookup(&self.qk) {
            if qv.valid() {
                return BeginAlign::Found(qv);
            }
            // An abandoned search left an empty slot; reuse it below.
        }

        match self.current.add(&self.qk) {
            Ok((h, _)) => {
                if let Ok(qv) = self.current.qval_mut(h) {
                    qv.reset();
                }
                self.state = InProgress::Cached(h);
                BeginAlign::Searching
            }
            Err(e) => {
                log::trace!("No room for seed {} in current-read cache: {}", self.qk, e);
                self.reset_read();
                BeginAlign::OutOfMemory
            }
        }
    }

    /// Report one reference substring (2-bit codes) with BWT range
    /// `[top, bot)` for the seed in progress.
    ///
    /// Returns `Ok(false)` when the substring repeats the previous one. On
    /// error the seed is abandoned (see [`abandon_align`](Self::abandon_align)):
    /// later calls fail with `NotAligning` and nothing is promoted.
    pub fn add_on_the_fly(&mut self, rfseq: &[u8], top: u32, bot: u32) -> CacheResult<bool> {
        let sak = SAKey::new(rfseq);
        let res = match self.state {
            InProgress::Idle => return Err(CacheError::NotAligning),
            InProgress::Cached(h) => self.current.add_on_the_fly_at(h, &sak, top, bot),
            InProgress::Scratch => {
                self.current
                    .add_on_the_fly(&mut self.scratch, &sak, top, bot)
            }
        };
        let added = match res {
            Ok(added) => added,
            Err(e) => {
                self.abandon_align();
                return Err(e);
            }
        };
        if added {
            self.rangen += 1;
            self.eltsn += (bot - top) as usize;
        }
        Ok(added)
    }

    /// Close the seed in progress and return its QVal. A seed with no
    /// associations yields the empty QVal (0, 0, 0). A cacheable seed is
    /// promoted to the local tier if there is one, else to the shared tier.
    pub fn finish_align(&mut self) -> CacheResult<QVal> {
        let res = match self.state {
            InProgress::Idle => Err(CacheError::NotAligning),
            InProgress::Scratch => {
                if !self.scratch.valid() {
                    self.scratch.init(0, 0, 0);
                }
                Ok(self.scratch)
            }
            InProgress::Cached(h) => self.current.qval_mut(h).map(|qv| {
                if !qv.valid() {
                    qv.init(0, 0, 0);
                }
                *qv
            }),
        };

        if let (InProgress::Cached(_), Ok(qv)) = (self.state, &res) {
            let src: &CacheStore = &*self.current;
            if let Some(local) = self.local.as_deref_mut() {
                if local.clear_copy(&self.qk, qv, src) {
                    log::debug!("Local cache turned over (version {})", local.version());
                }
            } else if let Some(shared) = &self.shared {
                let mut guard = shared.lock();
                if guard.clear_copy(&self.qk, qv, src) {
                    log::debug!("Shared cache turned over (version {})", guard.version());
                }
            }
        }

        self.reset_read();
        res
    }

    /// Drop the seed in progress without promoting it, e.g. after
    /// `add_on_the_fly` failed and the associations are incomplete. A slot
    /// already taken in the current-read cache stays invalid and is reused
    /// if the seed comes up again before the next read.
    pub fn abandon_align(&mut self) {
        if let InProgress::Cached(h) = self.state {
            if let Ok(qv) = self.current.qval_mut(h) {
                qv.reset();
            }
        }
        self.reset_read();
    }

    /// Find `qk` in the first tier that has it. A hit outside the current
    /// tier is copied into the current tier first, so the handle returned
    /// always refers to the current-read cache. `None` on a miss, or when the
    /// current tier has no room for the copy.
    ///
    /// An invalid current-tier QVal left by an abandoned search counts as a
    /// miss there; a hit further up replaces it.
    pub fn query_copy(&mut self, qk: &QKey) -> Option<QValHandle> {
        if let Some(h) = self.current.query(qk) {
            if self.current.qval(h).is_ok_and(|qv| qv.valid()) {
                return Some(h);
            }
        }
        if let Some(local) = self.local.as_deref() {
            if let Some(qv) = local.lookup(qk) {
                self.current.copy(qk, &qv, local).ok()?;
                return self.current.query(qk);
            }
        }
        if let Some(shared) = &self.shared {
            let guard = shared.lock();
            if let Some(qv) = guard.lookup(qk) {
                self.current.copy(qk, &qv, &guard).ok()?;
                return self.current.query(qk);
            }
        }
        None
    }

    /// Find `qk` in the first tier that has it, without copying.
    pub fn query(&self, qk: &QKey) -> Option<(CacheTier, QVal)> {
        if let Some(qv) = self.current.lookup(qk).filter(|qv| qv.valid()) {
            return Some((CacheTier::Current, qv));
        }
        if let Some(qv) = self.local.as_deref().and_then(|l| l.lookup(qk)) {
            return Some((CacheTier::Local, qv));
        }
        self.shared
            .as_ref()
            .and_then(|s| s.query(qk))
            .map(|qv| (CacheTier::Shared, qv))
    }

    /// Tuples of `qv`, which must come from the current-read cache.
    pub fn query_qval<'a>(&'a self, qv: &QVal, out: &mut Vec<SATuple<'a>>) -> CacheResult<()> {
        self.current.query_qval(qv, out)
    }

    /// Tuples of `qk` as held by the current-read cache.
    pub fn query_ex<'a>(&'a self, qk: &QKey, out: &mut Vec<SATuple<'a>>) -> CacheResult<bool> {
        self.current.query_ex(qk, out)
    }

    /// The caller is done with the current read.
    pub fn next_read(&mut self) {
        self.current.clear();
        self.reset_read();
    }

    /// Turn over every tier.
    pub fn clear(&mut self) {
        self.current.clear();
        if let Some(local) = self.local.as_deref_mut() {
            local.clear();
        }
        if let Some(shared) = &self.shared {
            shared.clear();
        }
        self.reset_read();
    }

    /// True iff a seed is between `begin_align` and `finish_align`.
    pub fn aligning(&self) -> bool {
        self.state != InProgress::Idle
    }

    pub fn cur_num_ranges(&self) -> usize {
        self.rangen
    }

    pub fn cur_num_elts(&self) -> usize {
        self.eltsn
    }

    pub fn current(&self) -> &CacheStore {
        &*self.current
    }

    pub fn current_mut(&mut self) -> &mut CacheStore {
        &mut *self.current
    }

    fn reset_read(&mut self) {
        self.state = InProgress::Idle;
        self.rangen = 0;
        self.eltsn = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::encode_ascii;

    fn codes(s: &str) -> Vec<u8> {
        encode_ascii(s.as_bytes())
    }

    #[test]
    fn test_begin_add_finish() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);

        assert_eq!(iface.begin_align(&codes("ACGTACGT")), BeginAlign::Searching);
        assert!(iface.aligning());
        assert!(iface.add_on_the_fly(&codes("ACGTACGT"), 100, 105).unwrap());
        assert!(iface.add_on_the_fly(&codes("ACGTACGA"), 200, 202).unwrap());
        assert_eq!(iface.cur_num_ranges(), 2);
        assert_eq!(iface.cur_num_elts(), 7);

        let qv = iface.finish_align().unwrap();
        assert!(!iface.aligning());
        assert_eq!(iface.cur_num_ranges(), 0);
        assert_eq!(qv.num_ranges(), 2);
        assert_eq!(qv.num_elts(), 7);

        assert_eq!(iface.begin_align(&codes("ACGTACGT")), BeginAlign::Found(qv));
        assert!(!iface.aligning());
    }

    #[test]
    fn test_no_matches_yields_empty_qval() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        iface.begin_align(&codes("TTTT"));
        let qv = iface.finish_align().unwrap();
        assert_eq!(qv, QVal::new(0, 0, 0));
        assert!(qv.is_empty());
    }

    #[test]
    fn test_uncacheable_seed_uses_scratch() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        assert_eq!(iface.begin_align(&codes("ACGNACGT")), BeginAlign::Searching);
        iface.add_on_the_fly(&codes("ACGAACGT"), 1, 4).unwrap();
        let qv = iface.finish_align().unwrap();
        assert_eq!(qv.num_ranges(), 1);
        assert_eq!(iface.current().q_num_keys(), 0);

        let mut tups = Vec::new();
        iface.query_qval(&qv, &mut tups).unwrap();
        assert_eq!(tups.len(), 1);
        assert_eq!(tups[0].rows(), 3);
    }

    #[test]
    fn test_add_on_the_fly_requires_begin() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        assert_eq!(
            iface.add_on_the_fly(&codes("ACGT"), 0, 1),
            Err(CacheError::NotAligning)
        );
        assert_eq!(iface.finish_align(), Err(CacheError::NotAligning));
    }

    #[test]
    fn test_abandoned_seed_is_not_cached() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut local = CacheStore::new(1 << 20, 1024);
        {
            let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
            let seed = codes("CATCATCA");
            let q = QKey::new(&seed);
            iface.begin_align(&seed);
            iface.add_on_the_fly(&seed, 4, 6).unwrap();
            iface.abandon_align();
            assert!(!iface.aligning());
            assert_eq!(iface.query(&q), None);
            assert_eq!(iface.query_copy(&q), None);

            // Same seed again in the same read reuses the slot
            assert_eq!(iface.begin_align(&seed), BeginAlign::Searching);
            iface.add_on_the_fly(&seed, 4, 6).unwrap();
            let qv = iface.finish_align().unwrap();
            assert_eq!(qv.num_ranges(), 1);
            assert_eq!(iface.current().q_num_keys(), 1);
        }
        assert_eq!(local.q_num_keys(), 1);
    }

    #[test]
    fn test_failed_add_drops_the_seed() {
        let mut cur = CacheStore::new(16 * 1024, 1024);
        let mut local = CacheStore::new(1 << 20, 1024);
        {
            let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
            let seed = codes("ACGTTGCA");
            assert_eq!(iface.begin_align(&seed), BeginAlign::Searching);
            iface.add_on_the_fly(&codes("ACGTTGCA"), 10, 11).unwrap();
            assert_eq!(
                iface.add_on_the_fly(&codes("ACGTTGCC"), 0, 100_000),
                Err(CacheError::PoolExhausted)
            );
            assert!(!iface.aligning());
            assert_eq!(
                iface.add_on_the_fly(&codes("ACGTTGCG"), 0, 1),
                Err(CacheError::NotAligning)
            );
            assert_eq!(iface.finish_align(), Err(CacheError::NotAligning));
            assert_eq!(iface.query(&QKey::new(&seed)), None);
            assert!(iface.current().check_invariants().is_ok());
        }
        assert_eq!(local.q_num_keys(), 0);
    }

    #[test]
    fn test_query_copy_looks_past_abandoned_slot() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut local = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
        let seed = codes("TTGACCAT");
        let q = QKey::new(&seed);
        iface.begin_align(&seed);
        iface.add_on_the_fly(&seed, 3, 7).unwrap();
        iface.finish_align().unwrap();
        iface.next_read();

        // Next read abandons the same seed before looking it up
        assert_eq!(iface.begin_align(&seed), BeginAlign::Searching);
        iface.abandon_align();
        let h = iface.query_copy(&q).unwrap();
        let qv = iface.current().qval(h).unwrap();
        assert!(qv.valid());
        assert_eq!(qv.num_elts(), 4);
        assert_eq!(iface.query(&q).map(|(t, _)| t), Some(CacheTier::Current));
        assert_eq!(iface.current().q_num_keys(), 1);
    }

    #[test]
    fn test_out_of_memory() {
        let mut cur = CacheStore::new(0, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, None);
        assert_eq!(iface.begin_align(&codes("ACGT")), BeginAlign::OutOfMemory);
        assert!(!iface.aligning());
    }

    #[test]
    fn test_finish_promotes_to_local_then_query_copy() {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut local = CacheStore::new(1 << 20, 1024);
        {
            let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
            iface.begin_align(&codes("GGGGCCCC"));
            iface.add_on_the_fly(&codes("GGGGCCCC"), 10, 13).unwrap();
            iface.finish_align().unwrap();
            iface.next_read();
            assert!(iface.current().is_empty());

            let q = QKey::new(&codes("GGGGCCCC"));
            assert_eq!(iface.query(&q).map(|(t, _)| t), Some(CacheTier::Local));
            let h = iface.query_copy(&q).unwrap();
            let qv = iface.current().qval(h).unwrap();
            assert_eq!(qv.num_elts(), 3);
            assert_eq!(iface.query(&q).map(|(t, _)| t), Some(CacheTier::Current));
        }
        assert_eq!(local.q_num_keys(), 1);
    }

    #[test]
    fn test_finish_promotes_to_shared_without_local() {
        let shared = Arc::new(AlignmentCache::new(1 << 20));
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, None, Some(Arc::clone(&shared)));
        iface.begin_align(&codes("ACACACAC"));
        iface.add_on_the_fly(&codes("ACACACAC"), 0, 2).unwrap();
        iface.finish_align().unwrap();
        assert_eq!(shared.q_num_keys(), 1);
        assert!(shared.query(&QKey::new(&codes("ACACACAC"))).is_some());
    }

    #[test]
    fn test_clear_all_tiers() {
        let shared = Arc::new(AlignmentCache::new(1 << 20));
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut local = CacheStore::new(1 << 20, 1024);
        {
            let mut iface =
                AlignmentCacheIface::new(&mut cur, Some(&mut local), Some(Arc::clone(&shared)));
            iface.begin_align(&codes("ACGT"));
            iface.add_on_the_fly(&codes("ACGT"), 0, 1).unwrap();
            iface.finish_align().unwrap();
            iface.clear();
        }
        assert_eq!(cur.version(), 1);
        assert_eq!(local.version(), 1);
        assert_eq!(shared.version(), 1);
        assert!(local.is_empty());
    }
}
