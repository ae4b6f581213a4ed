//! Batch driver: seeds batches of reads on a pool of workers, each with its
//! own current-read and local caches, all sharing one process-wide cache.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::cache::{AlignmentCache, AlignmentCacheIface, CacheStore};
use crate::cache_opt::CacheOpt;
use crate::index::SeedIndex;
use crate::io::fastq_reader::ReadBatch;
use crate::seeding::{ReadSeedResult, SeedSearcher, SeedStats};

/// Caches and random state owned by one worker for the whole run.
pub struct SeedWorker {
    current: CacheStore,
    local: Option<CacheStore>,
    rng: StdRng,
    stats: SeedStats,
}

impl SeedWorker {
    pub fn new(opt: &CacheOpt, id: usize) -> Self {
        Self {
            current: CacheStore::new(opt.current_bytes, opt.page_size),
            local: opt
                .local_enabled()
                .then(|| CacheStore::new(opt.local_bytes, opt.page_size)),
            rng: StdRng::seed_from_u64(opt.rng_seed.wrapping_add(id as u64)),
            stats: SeedStats::default(),
        }
    }

    /// Seed `seqs` in order.
    pub fn run<I: SeedIndex + ?Sized>(
        &mut self,
        searcher: &SeedSearcher,
        index: &I,
        shared: Option<&Arc<AlignmentCache>>,
        seqs: &[Vec<u8>],
    ) -> Vec<ReadSeedResult> {
        let mut iface =
            AlignmentCacheIface::new(&mut self.current, self.local.as_mut(), shared.cloned());
        let results: Vec<ReadSeedResult> = seqs
            .iter()
            .map(|seq| searcher.search_read(&mut iface, index, seq, &mut self.rng))
            .collect();
        for r in &results {
            self.stats += r.stats;
        }
        results
    }

    pub fn stats(&self) -> SeedStats {
        self.stats
    }

    pub fn local(&self) -> Option<&CacheStore> {
        self.local.as_ref()
    }
}

pub struct Replay<'i, I: SeedIndex + ?Sized> {
    index: &'i I,
    searcher: SeedSearcher,
    shared: Option<Arc<AlignmentCache>>,
    workers: Vec<SeedWorker>,
}

impl<'i, I: SeedIndex + ?Sized> Replay<'i, I> {
    pub fn new(opt: &CacheOpt, index: &'i I) -> Self {
        let shared = opt
            .shared_enabled()
            .then(|| Arc::new(AlignmentCache::with_page_size(opt.shared_bytes, opt.page_size)));
        let n_workers = opt.n_threads.max(1);
        log::debug!(
            "{} workers; current {} B, local {} B, shared {} B",
            n_workers,
            opt.current_bytes,
            opt.local_bytes,
            opt.shared_bytes
        );
        Self {
            index,
            searcher: SeedSearcher::new(opt),
            shared,
            workers: (0..n_workers).map(|id| SeedWorker::new(opt, id)).collect(),
        }
    }

    /// Seed every read of `batch`; results come back in batch order.
    pub fn process_batch(&mut self, batch: &ReadBatch) -> Vec<ReadSeedResult> {
        if batch.is_empty() {
            return Vec::new();
        }
        let chunk = batch.len().div_ceil(self.workers.len());
        let searcher = &self.searcher;
        let index = self.index;
        let shared = self.shared.as_ref();
        let per_worker: Vec<Vec<ReadSeedResult>> = self
            .workers
            .par_iter_mut()
            .zip(batch.seqs.par_chunks(chunk))
            .map(|(w, seqs)| w.run(searcher, index, shared, seqs))
            .collect();
        per_worker.into_iter().flatten().collect()
    }

    /// Totals over every worker so far.
    pub fn stats(&self) -> SeedStats {
        let mut total = SeedStats::default();
        for w in &self.workers {
            total += w.stats();
        }
        total
    }

    pub fn shared(&self) -> Option<&Arc<AlignmentCache>> {
        self.shared.as_ref()
    }

    pub fn workers(&self) -> &[SeedWorker] {
        &self.workers
    }
}
