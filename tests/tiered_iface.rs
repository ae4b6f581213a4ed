// tests/tiered_iface.rs
// Three-tier protocol: recording a seed, promotion to the next tier up,
// pulling hits back down, turnover of a full tier, and running with tiers
// too small to hold anything.

use std::sync::Arc;

use ferrous_seedcache::CacheError;
use ferrous_seedcache::cache::key::encode_ascii;
use ferrous_seedcache::cache::{
    AlignmentCache, AlignmentCacheIface, BeginAlign, CacheStore, CacheTier, QKey,
};

fn codes(s: &str) -> Vec<u8> {
    encode_ascii(s.as_bytes())
}

/// Record `seed` with one association per `(substring, top, bot)`.
fn record(iface: &mut AlignmentCacheIface<'_>, seed: &str, assocs: &[(&str, u32, u32)]) {
    assert_eq!(iface.begin_align(&codes(seed)), BeginAlign::Searching);
    for (rf, top, bot) in assocs {
        iface.add_on_the_fly(&codes(rf), *top, *bot).unwrap();
    }
    iface.finish_align().unwrap();
}

#[test]
fn promotion_prefers_local_over_shared() {
    let shared = Arc::new(AlignmentCache::new(1 << 20));
    let mut cur = CacheStore::new(1 << 20, 1024);
    let mut local = CacheStore::new(1 << 20, 1024);
    {
        let mut iface =
            AlignmentCacheIface::new(&mut cur, Some(&mut local), Some(Arc::clone(&shared)));
        record(&mut iface, "ACGTACGTAA", &[("ACGTACGTAA", 5, 9)]);
        iface.next_read();
    }
    assert_eq!(local.q_num_keys(), 1);
    assert_eq!(shared.q_num_keys(), 0);
}

#[test]
fn shared_hit_is_copied_into_current() {
    let shared = Arc::new(AlignmentCache::new(1 << 20));

    // One worker fills the shared tier
    let mut cur_a = CacheStore::new(1 << 20, 1024);
    {
        let mut a = AlignmentCacheIface::new(&mut cur_a, None, Some(Arc::clone(&shared)));
        record(
            &mut a,
            "GGGACCCTTT",
            &[("GGGACCCTTT", 10, 12), ("GGGACCCTTA", 40, 43)],
        );
        a.next_read();
    }

    // Another worker finds it there
    let mut cur_b = CacheStore::new(1 << 20, 1024);
    let mut b = AlignmentCacheIface::new(&mut cur_b, None, Some(Arc::clone(&shared)));
    let qk = QKey::new(&codes("GGGACCCTTT"));
    let (tier, qv) = b.query(&qk).unwrap();
    assert_eq!(tier, CacheTier::Shared);
    assert_eq!(qv.num_ranges(), 2);

    let h = b.query_copy(&qk).unwrap();
    let qv = b.current().qval(h).unwrap();
    let mut tups = Vec::new();
    b.query_qval(&qv, &mut tups).unwrap();
    let tops: Vec<u32> = tups.iter().map(|t| t.top).collect();
    let rows: Vec<usize> = tups.iter().map(|t| t.rows()).collect();
    assert_eq!(tops, vec![10, 40]);
    assert_eq!(rows, vec![2, 3]);

    // begin_align now answers from the current tier
    assert!(matches!(
        b.begin_align(&codes("GGGACCCTTT")),
        BeginAlign::Found(_)
    ));
}

#[test]
fn handles_are_stale_after_next_read() {
    let mut cur = CacheStore::new(1 << 20, 1024);
    let mut local = CacheStore::new(1 << 20, 1024);
    let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
    record(&mut iface, "TTTTGGGG", &[("TTTTGGGG", 0, 1)]);
    let h = iface.query_copy(&QKey::new(&codes("TTTTGGGG"))).unwrap();
    iface.next_read();
    assert!(matches!(
        iface.current().qval(h),
        Err(CacheError::StaleHandle { .. })
    ));
}

#[test]
fn full_local_tier_turns_over() {
    let mut cur = CacheStore::new(1 << 20, 1024);
    let mut local = CacheStore::new(8 * 1024, 1024);
    {
        let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
        for i in 0..200u64 {
            let seed = QKey::from_packed(i * 7919, 16).to_codes();
            let rf = QKey::from_packed(i * 104_729, 16).to_codes();
            iface.begin_align(&seed);
            iface.add_on_the_fly(&rf, 0, 30).unwrap();
            iface.finish_align().unwrap();
            iface.next_read();
        }
    }
    assert!(local.version() > 0);
    assert!(local.q_num_keys() > 0);
    assert!(local.check_invariants().is_ok());
}

#[test]
fn tiny_tiers_degrade_without_failing() {
    let shared = Arc::new(AlignmentCache::with_page_size(1024, 1024));
    let mut cur = CacheStore::new(1 << 20, 1024);
    let mut iface = AlignmentCacheIface::new(&mut cur, None, Some(Arc::clone(&shared)));
    record(&mut iface, "ACACACACGG", &[("ACACACACGG", 0, 500)]);
    iface.next_read();
    assert_eq!(shared.q_num_keys(), 0);
    assert_eq!(shared.version(), 1);

    let mut none = CacheStore::new(0, 1024);
    let mut iface = AlignmentCacheIface::new(&mut none, None, None);
    assert_eq!(iface.begin_align(&codes("ACGT")), BeginAlign::OutOfMemory);
    assert_eq!(
        iface.add_on_the_fly(&codes("ACGT"), 0, 1),
        Err(CacheError::NotAligning)
    );
}

#[test]
fn second_promotion_keeps_first_version() {
    let mut local = CacheStore::new(1 << 20, 1024);
    for (top, bot) in [(0u32, 2u32), (100, 110)] {
        let mut cur = CacheStore::new(1 << 20, 1024);
        let mut iface = AlignmentCacheIface::new(&mut cur, Some(&mut local), None);
        record(&mut iface, "CCCCAAAA", &[("CCCCAAAA", top, bot)]);
    }
    let qv = local.lookup(&QKey::new(&codes("CCCCAAAA"))).unwrap();
    assert_eq!(qv.num_elts(), 2);
}
