//! One stratum of the seed cache: two linked multimaps over a fixed-budget pool.
//!
//! ```text
//!  seed map (QKey -> QVal)      ref list (SAKey)        SA map (SAKey -> SAVal)     element list (u32)
//!  ┌──────────┬───────────┐    ┌─────┬─────┬─────┐     ┌──────┬──────────────┐     ┌────┬────┬────┬────┐
//!  │ ACGTTGCA │ off=0, n=2│───▶│ sk1 │ sk2 │ ... │────▶│ sk1  │ top, i=0, 3  │────▶│ o0 │ o1 │ o2 │ .. │
//!  └──────────┴───────────┘    └─────┴─────┴─────┘     └──────┴──────────────┘     └────┴────┴────┴────┘
//! ```
//!
//! Referential completeness: every SAKey reachable from a QVal has an SAVal
//! whose element range is fully allocated. Writers keep this by appending
//! list data first and inserting the map entry that makes it reachable last,
//! so running out of pool memory midway leaves only unreachable leftovers,
//! which the next clear reclaims.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use super::key::{INVALID, QKey, QVal, SAKey, SAVal};
use super::tuple::SATuple;
use crate::core::arena_map::ArenaMap;
use crate::core::plist::PagedList;
use crate::core::pool::{CACHE_PAGE_SIZE, Pool};
use crate::error::{CacheError, CacheResult};

/// Location of a QVal inside a [`CacheStore`], tagged with the cache version
/// it was issued under. Any use after a clear fails with
/// [`CacheError::StaleHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QValHandle {
    slot: u32,
    version: u32,
}

impl QValHandle {
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }
}

/// The cache contents. Holding `&mut CacheStore` (directly for an exclusively
/// owned cache, or through [`AlignmentCache::lock`]) is what entitles a caller
/// to mutate it, so nothing in here locks.
pub struct CacheStore {
    pool: Pool,
    qmap: ArenaMap<QKey, QVal>,
    qlist: PagedList<SAKey>,
    samap: ArenaMap<SAKey, SAVal>,
    salist: PagedList<u32>,
    version: u32,
}

impl CacheStore {
    pub fn new(bytes: u64, page_size: usize) -> Self {
        Self {
            pool: Pool::new(bytes, page_size),
            qmap: ArenaMap::new(page_size),
            qlist: PagedList::new(page_size),
            samap: ArenaMap::new(page_size),
            salist: PagedList::new(page_size),
            version: 0,
        }
    }

    #[inline]
    fn check(&self, h: QValHandle) -> CacheResult<()> {
        if h.version != self.version || h.slot as usize >= self.qmap.num_slots() {
            return Err(CacheError::StaleHandle {
                handle: h.version,
                current: self.version,
            });
        }
        Ok(())
    }

    /// Handle to the QVal stored for `qk`, if any.
    pub fn query(&self, qk: &QKey) -> Option<QValHandle> {
        self.qmap.lookup(qk).map(|slot| QValHandle {
            slot,
            version: self.version,
        })
    }

    /// Copy of the QVal stored for `qk`, if any.
    pub fn lookup(&self, qk: &QKey) -> Option<QVal> {
        self.qmap.lookup(qk).map(|slot| self.qmap.payload(slot))
    }

    pub fn qval(&self, h: QValHandle) -> CacheResult<QVal> {
        self.check(h)?;
        Ok(self.qmap.payload(h.slot))
    }

    pub fn qval_mut(&mut self, h: QValHandle) -> CacheResult<&mut QVal> {
        self.check(h)?;
        Ok(self.qmap.payload_mut(h.slot))
    }

    /// Find or create the QVal slot for a seed about to be searched. A new
    /// slot holds an invalid QVal until the first `add_on_the_fly`.
    pub fn add(&mut self, qk: &QKey) -> CacheResult<(QValHandle, bool)> {
        if !qk.cacheable() {
            return Err(CacheError::Uncacheable);
        }
        let (slot, added) = self.qmap.add(&mut self.pool, *qk, QVal::default())?;
        Ok((
            QValHandle {
                slot,
                version: self.version,
            },
            added,
        ))
    }

    /// Associate reference substring `sak`, with BWT range `[top, bot)`, with
    /// the in-progress `qv`.
    ///
    /// The first association of `sak` in this cache allocates `bot - top`
    /// placeholder elements; later ones only append the key. `qv` is updated
    /// only once everything is allocated, and a failed call leaves the
    /// reference list as it found it. An `sak` equal to the entry `qv` added
    /// last is skipped and `Ok(false)` returned.
    ///
    /// A non-empty `qv` can only grow while its range ends the list; once
    /// another seed has appended after it the call fails with
    /// [`CacheError::RangeNotAtTail`].
    pub fn add_on_the_fly(
        &mut self,
        qv: &mut QVal,
        sak: &SAKey,
        top: u32,
        bot: u32,
    ) -> CacheResult<bool> {
        if !sak.cacheable() {
            return Err(CacheError::Uncacheable);
        }
        debug_assert!(bot >= top);
        let nelt = bot - top;

        let extending = qv.valid() && qv.num_ranges() > 0;
        if extending {
            let end = (qv.offset() + qv.num_ranges()) as usize;
            if self.qlist.get(end - 1) == *sak {
                return Ok(false);
            }
            if end != self.qlist.len() {
                return Err(CacheError::RangeNotAtTail);
            }
        }

        let idx = self.qlist.add(&mut self.pool, *sak)?;
        if let Err(e) = self.add_sa_entry(sak, top, nelt) {
            self.qlist.truncate(idx);
            return Err(e);
        }

        if !extending {
            qv.init(idx as u32, 0, 0);
        }
        qv.add_range(nelt);
        Ok(true)
    }

    /// Give `sak` an SAVal with `nelt` placeholder elements unless it has one.
    /// On failure the element list is restored.
    fn add_sa_entry(&mut self, sak: &SAKey, top: u32, nelt: u32) -> CacheResult<()> {
        if self.samap.lookup(sak).is_some() {
            return Ok(());
        }
        let start = self.salist.len();
        self.salist.reserve(&mut self.pool, nelt as usize)?;
        for _ in 0..nelt {
            self.salist.add_reserved(INVALID);
        }
        if let Err(e) = self
            .samap
            .add(&mut self.pool, *sak, SAVal::new(top, start as u32, nelt))
        {
            self.salist.truncate(start);
            return Err(e);
        }
        Ok(())
    }

    /// [`add_on_the_fly`](Self::add_on_the_fly) against the QVal stored at `h`.
    pub fn add_on_the_fly_at(
        &mut self,
        h: QValHandle,
        sak: &SAKey,
        top: u32,
        bot: u32,
    ) -> CacheResult<bool> {
        let mut qv = self.qval(h)?;
        let res = self.add_on_the_fly(&mut qv, sak, top, bot);
        *self.qmap.payload_mut(h.slot) = qv;
        res
    }

    /// Append one [`SATuple`] per reference substring of `qv`, in list order.
    pub fn query_qval<'a>(&'a self, qv: &QVal, out: &mut Vec<SATuple<'a>>) -> CacheResult<()> {
        if !qv.valid() {
            return Ok(());
        }
        let first = out.len();
        let refi = qv.offset() as usize;
        let reff = refi + qv.num_ranges() as usize;
        for i in refi..reff {
            let sak = self.qlist.get(i);
            let slot = self.samap.lookup(&sak).ok_or(CacheError::MissingSaEntry)?;
            let sav = self.samap.payload(slot);
            out.push(SATuple::new(
                sak,
                sav.top,
                self.salist.slice(sav.i as usize, sav.len as usize),
            ));
            if out.len() > first + 1 {
                let n = out.len();
                debug_assert!(
                    out[n - 1] != out[n - 2],
                    "identical adjacent tuples for {}",
                    sak
                );
            }
        }
        Ok(())
    }

    /// Look up `qk` and append its tuples. Returns whether the key was present.
    pub fn query_ex<'a>(&'a self, qk: &QKey, out: &mut Vec<SATuple<'a>>) -> CacheResult<bool> {
        match self.lookup(qk) {
            Some(qv) => self.query_qval(&qv, out).map(|_| true),
            None => Ok(false),
        }
    }

    /// Copy `qk` and its whole closure (QVal, SAKeys, SAVals, elements) from
    /// `src` into this cache.
    ///
    /// If `qk` is already here with a valid QVal nothing is merged: the first
    /// copy wins. An invalid QVal left by an abandoned search is replaced.
    pub fn copy(&mut self, qk: &QKey, qv: &QVal, src: &CacheStore) -> CacheResult<()> {
        if !qk.cacheable() {
            return Err(CacheError::Uncacheable);
        }
        let placeholder = match self.qmap.lookup(qk) {
            Some(slot) if self.qmap.payload(slot).valid() => return Ok(()),
            other => other,
        };

        let offset = self.qlist.len();
        let res = self.copy_closure(qv, src);
        if res.is_err() {
            self.qlist.truncate(offset);
        }
        let (ranges, elts) = res?;

        // Inserting the key last is what makes the copied closure reachable.
        let copied = QVal::new(offset as u32, ranges, elts);
        match placeholder {
            Some(slot) => *self.qmap.payload_mut(slot) = copied,
            None => {
                self.qmap.add(&mut self.pool, *qk, copied)?;
            }
        }
        Ok(())
    }

    /// Append the reference keys of `qv` and any SA entries missing here.
    /// Returns the (ranges, elements) of the copied QVal.
    fn copy_closure(&mut self, qv: &QVal, src: &CacheStore) -> CacheResult<(u32, u32)> {
        if !qv.valid() {
            return Ok((0, 0));
        }
        let srci = qv.offset() as usize;
        for i in srci..srci + qv.num_ranges() as usize {
            let sak = src.qlist.get(i);
            self.qlist.add(&mut self.pool, sak)?;
            if self.samap.lookup(&sak).is_some() {
                continue;
            }
            let src_slot = src.samap.lookup(&sak).ok_or(CacheError::MissingSaEntry)?;
            let sav = src.samap.payload(src_slot);
            let start = self.salist.len();
            self.salist.reserve(&mut self.pool, sav.len as usize)?;
            for j in 0..sav.len as usize {
                self.salist.add_reserved(src.salist.get(sav.i as usize + j));
            }
            if let Err(e) = self
                .samap
                .add(&mut self.pool, sak, SAVal::new(sav.top, start as u32, sav.len))
            {
                self.salist.truncate(start);
                return Err(e);
            }
        }
        Ok((qv.num_ranges(), qv.num_elts()))
    }

    /// [`copy`](Self::copy), turning the cache over and retrying once if it is
    /// full. Returns whether a clear happened.
    pub fn clear_copy(&mut self, qk: &QKey, qv: &QVal, src: &CacheStore) -> bool {
        match self.copy(qk, qv, src) {
            Ok(()) => false,
            Err(CacheError::PoolExhausted) => {
                log::debug!(
                    "Cache full ({} keys, {} bytes), turning over to fit {}",
                    self.q_num_keys(),
                    self.bytes_used(),
                    qk
                );
                self.clear();
                if let Err(e) = self.copy(qk, qv, src) {
                    log::warn!(
                        "A key couldn't fit in an empty cache ({}); try increasing the cache size",
                        e
                    );
                    // Nothing reachable was handed out since the clear.
                    self.reset_contents();
                }
                true
            }
            Err(e) => {
                log::debug!("Skipping promotion of {}: {}", qk, e);
                false
            }
        }
    }

    /// Turn the cache over: drop everything and bump the version. Every
    /// outstanding handle and list index becomes invalid.
    pub fn clear(&mut self) {
        self.reset_contents();
        self.version = self.version.wrapping_add(1);
    }

    fn reset_contents(&mut self) {
        self.pool.reset();
        self.qmap.clear();
        self.qlist.clear();
        self.samap.clear();
        self.salist.clear();
    }

    /// Element `idx` of the element list (a reference offset, or
    /// `0xffff_ffff` while unresolved).
    pub fn element(&self, idx: usize) -> u32 {
        self.salist.get(idx)
    }

    /// Record the resolved reference offset of element `idx`.
    pub fn set_element(&mut self, idx: usize, offset: u32) {
        self.salist.set(idx, offset);
    }

    /// True iff the seed map holds no key.
    pub fn is_empty(&self) -> bool {
        self.qmap.is_empty()
    }

    /// Number of keys in the seed multimap.
    pub fn q_num_keys(&self) -> usize {
        self.qmap.len()
    }

    /// Number of keys in the suffix-array multimap.
    pub fn sa_num_keys(&self) -> usize {
        self.samap.len()
    }

    /// Number of entries in the reference-substring list.
    pub fn q_size(&self) -> usize {
        self.qlist.len()
    }

    /// Number of entries in the element list.
    pub fn sa_size(&self) -> usize {
        self.salist.len()
    }

    /// Number of times the cache has been turned over.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn bytes_used(&self) -> u64 {
        self.pool.bytes_used()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.pool.capacity_bytes()
    }

    /// Verify referential completeness and QVal sanity for every reachable entry.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut problem = None;
        self.qmap.for_each(|qk, slot| {
            if problem.is_some() {
                return;
            }
            let qv = self.qmap.payload(slot);
            if !qv.valid() {
                return;
            }
            if qv.num_elts() < qv.num_ranges() {
                problem = Some(format!("{}: {} elements < {} ranges", qk, qv.num_elts(), qv.num_ranges()));
                return;
            }
            let end = qv.offset() as usize + qv.num_ranges() as usize;
            if end > self.qlist.len() {
                problem = Some(format!("{}: range ends at {} past list of {}", qk, end, self.qlist.len()));
                return;
            }
            for i in qv.offset() as usize..end {
                let sak = self.qlist.get(i);
                match self.samap.lookup(&sak) {
                    None => {
                        problem = Some(format!("{}: reference key {} has no SA entry", qk, sak));
                        return;
                    }
                    Some(s) => {
                        let sav = self.samap.payload(s);
                        if !sav.valid() || (sav.i + sav.len) as usize > self.salist.len() {
                            problem = Some(format!("{}: SA entry of {} is incomplete", qk, sak));
                            return;
                        }
                    }
                }
            }
        });
        match problem {
            Some(p) => Err(p),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("version", &self.version)
            .field("q_num_keys", &self.q_num_keys())
            .field("sa_num_keys", &self.sa_num_keys())
            .field("q_size", &self.q_size())
            .field("sa_size", &self.sa_size())
            .field("bytes_used", &self.bytes_used())
            .field("capacity_bytes", &self.capacity_bytes())
            .finish()
    }
}

/// A cache stratum shared between workers, behind a mutex.
///
/// Sharing is a matter of type: exclusively owned caches (current-read,
/// per-thread local) are plain [`CacheStore`]s and never lock. A shared cache
/// is held in an `Arc` and reached through [`lock`](Self::lock); the returned
/// guard is the capability passed down to nested operations, so nothing
/// re-acquires a lock it already holds.
pub struct AlignmentCache {
    store: Mutex<CacheStore>,
}

impl AlignmentCache {
    pub fn new(bytes: u64) -> Self {
        Self::with_page_size(bytes, CACHE_PAGE_SIZE)
    }

    pub fn with_page_size(bytes: u64, page_size: usize) -> Self {
        Self {
            store: Mutex::new(CacheStore::new(bytes, page_size)),
        }
    }

    /// Lock the cache for the lifetime of the returned guard.
    pub fn lock(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock()
    }

    /// Copy of the QVal stored for `qk`, holding the lock for this call only.
    pub fn query(&self, qk: &QKey) -> Option<QVal> {
        self.lock().lookup(qk)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn version(&self) -> u32 {
        self.lock().version()
    }

    pub fn q_num_keys(&self) -> usize {
        self.lock().q_num_keys()
    }
}

impl fmt::Debug for AlignmentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignmentCache")
            .field("store", &*self.lock())
            .finish()
    }
}
