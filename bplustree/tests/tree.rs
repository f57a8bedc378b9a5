//! Integration tests exercising `BPlusTree` against a real buffer pool,
//! covering spec §8's quantified invariants and laws.

use bplustree::key::NaturalOrder;
use bplustree::tree::BPlusTree;
use bplustree::value::RowId;
use buffer_pool_manager::ConcurrentBufferPool;
use common::api::BufferPool;
use common::disk_manager::DiskManager;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use test_case::test_case;

fn rid(n: i32) -> RowId {
    RowId {
        page_id: n as usize,
        slot_index: (n % 7) as u16,
    }
}

/// Builds a tree with a deliberately small fanout so a handful of inserts
/// exercises splits, and a deliberately small pool so frames actually get
/// evicted and re-fetched mid-test.
fn small_tree() -> (BPlusTree<i32, RowId, NaturalOrder>, tempfile::TempPath) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.into_temp_path();
    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let pool = Arc::new(ConcurrentBufferPool::new(8, disk_manager));
    let header_guard = pool.new_page().unwrap();
    let header_page_id = header_guard.page_id();
    drop(header_guard);

    let tree = BPlusTree::new("orders_by_customer", header_page_id, pool, NaturalOrder, 4, 4).unwrap();
    (tree, path)
}

#[test]
fn empty_tree_has_no_root_and_finds_nothing() {
    let (tree, _path) = small_tree();
    assert!(tree.is_empty().unwrap());

    let mut out = Vec::new();
    assert!(!tree.get(&42, &mut out).unwrap());
    assert!(out.is_empty());
    assert!(tree.begin().unwrap().is_end());
    assert!(tree.begin_at(&0).unwrap().is_end());
}

#[test]
fn insert_then_get_round_trips() {
    let (tree, _path) = small_tree();
    for k in [10, 20, 30, 40, 50] {
        assert!(tree.insert(&k, &rid(k)).unwrap());
    }

    for k in [10, 20, 30, 40, 50] {
        let mut out = Vec::new();
        assert!(tree.get(&k, &mut out).unwrap());
        assert_eq!(out, vec![rid(k)]);
    }

    let mut out = Vec::new();
    assert!(!tree.get(&25, &mut out).unwrap());
}

#[test]
fn duplicate_insert_is_rejected_and_leaves_tree_unchanged() {
    let (tree, _path) = small_tree();
    assert!(tree.insert(&1, &rid(1)).unwrap());
    assert!(!tree.insert(&1, &rid(99)).unwrap());

    let mut out = Vec::new();
    assert!(tree.get(&1, &mut out).unwrap());
    assert_eq!(out, vec![rid(1)]);
}

#[test]
fn ascending_inserts_drive_repeated_splits_and_root_growth() {
    let (tree, _path) = small_tree();
    for k in 0..200 {
        assert!(tree.insert(&k, &rid(k)).unwrap());
    }

    for k in 0..200 {
        let mut out = Vec::new();
        assert!(tree.get(&k, &mut out).unwrap(), "missing key {k}");
        assert_eq!(out, vec![rid(k)]);
    }

    // I1/I5: the leaf chain from `begin()` must visit every key exactly
    // once, strictly ascending, and terminate at the end sentinel.
    let collected: Vec<i32> = tree.begin().unwrap().map(|(k, _)| k).collect();
    let expected: Vec<i32> = (0..200).collect();
    assert_eq!(collected, expected);
}

#[test]
fn shuffled_inserts_still_scan_in_ascending_order() {
    let (tree, _path) = small_tree();
    let mut keys: Vec<i32> = (0..150).collect();
    let mut rng = StdRng::seed_from_u64(7);
    keys.shuffle(&mut rng);

    for &k in &keys {
        assert!(tree.insert(&k, &rid(k)).unwrap());
    }

    let collected: Vec<i32> = tree.begin().unwrap().map(|(k, _)| k).collect();
    let expected: Vec<i32> = (0..150).collect();
    assert_eq!(collected, expected);
}

#[test_case(0; "start of range")]
#[test_case(37; "middle of range")]
#[test_case(149; "last key")]
#[test_case(150; "past every key")]
fn begin_at_yields_the_smallest_live_key_at_or_above(start: i32) {
    let (tree, _path) = small_tree();
    for k in (0..150).step_by(2) {
        assert!(tree.insert(&k, &rid(k)).unwrap());
    }

    let expected = (start..150).find(|k| k % 2 == 0);
    let actual = tree.begin_at(&start).unwrap().next().map(|(k, _)| k);
    assert_eq!(actual, expected);
}

#[test]
fn remove_then_get_returns_false() {
    let (tree, _path) = small_tree();
    for k in 0..50 {
        tree.insert(&k, &rid(k)).unwrap();
    }

    for k in (0..50).step_by(2) {
        tree.remove(&k).unwrap();
    }

    for k in 0..50 {
        let mut out = Vec::new();
        let found = tree.get(&k, &mut out).unwrap();
        assert_eq!(found, k % 2 == 1, "key {k}");
    }

    let collected: Vec<i32> = tree.begin().unwrap().map(|(k, _)| k).collect();
    let expected: Vec<i32> = (0..50).filter(|k| k % 2 == 1).collect();
    assert_eq!(collected, expected);
}

#[test]
fn remove_of_absent_key_is_a_no_op() {
    let (tree, _path) = small_tree();
    tree.insert(&1, &rid(1)).unwrap();
    tree.remove(&999).unwrap();

    let mut out = Vec::new();
    assert!(tree.get(&1, &mut out).unwrap());
}

#[test]
fn removing_every_key_shrinks_the_tree_back_to_empty() {
    let (tree, _path) = small_tree();
    let keys: Vec<i32> = (0..80).collect();
    for &k in &keys {
        tree.insert(&k, &rid(k)).unwrap();
    }
    for &k in &keys {
        tree.remove(&k).unwrap();
    }

    assert!(tree.is_empty().unwrap());
    assert!(tree.begin().unwrap().is_end());
}

#[test]
fn insert_and_remove_interleaved_preserve_scan_order() {
    let (tree, _path) = small_tree();
    let mut alive = std::collections::BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(99);
    let mut universe: Vec<i32> = (0..300).collect();
    universe.shuffle(&mut rng);

    for (i, &k) in universe.iter().enumerate() {
        if i % 3 == 2 && !alive.is_empty() {
            let victim = *alive.iter().next().unwrap();
            tree.remove(&victim).unwrap();
            alive.remove(&victim);
        }
        tree.insert(&k, &rid(k)).unwrap();
        alive.insert(k);
    }

    let collected: Vec<i32> = tree.begin().unwrap().map(|(k, _)| k).collect();
    let expected: Vec<i32> = alive.into_iter().collect();
    assert_eq!(collected, expected);
}

#[test]
fn flushing_persists_pages_to_the_backing_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.into_temp_path();
    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let pool = Arc::new(ConcurrentBufferPool::new(8, disk_manager));
    let header_guard = pool.new_page().unwrap();
    let header_page_id = header_guard.page_id();
    drop(header_guard);

    let tree = BPlusTree::new("durable", header_page_id, Arc::clone(&pool), NaturalOrder, 4, 4).unwrap();
    for k in 0..40 {
        tree.insert(&k, &rid(k)).unwrap();
    }
    pool.flush_all_pages().unwrap();

    // A second disk manager over the same file sees the flushed root, not
    // the zeroed page the file started with.
    let reread = Arc::new(DiskManager::new(&path).unwrap());
    let mut data = vec![0u8; common::api::PAGE_SIZE];
    reread.read_page(header_page_id, &mut data).unwrap();
    let root = usize::from_le_bytes(data[0..8].try_into().unwrap());
    assert_ne!(root, common::api::INVALID_PAGE_ID);
}
