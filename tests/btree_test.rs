//! Integration tests for the B+-tree index

use std::sync::Arc;
use std::thread;

use burrow::buffer::BufferPoolManager;
use burrow::common::{PageId, INVALID_PAGE_ID};
use burrow::index::{BPlusTree, OrdComparator};
use burrow::storage::disk::DiskManager;
use tempfile::NamedTempFile;

type IntTree = BPlusTree<i64, i64, OrdComparator>;

fn create_tree(
    pool_size: usize,
    leaf_max: usize,
    internal_max: usize,
) -> (IntTree, Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
    let tree = BPlusTree::new("test_index", Arc::clone(&bpm), OrdComparator, leaf_max, internal_max);
    (tree, bpm, temp_file)
}

fn collect_keys(tree: &IntTree) -> Vec<i64> {
    tree.begin()
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect()
}

fn assert_sorted_unique(keys: &[i64]) {
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "keys out of order: {pair:?}");
    }
}

#[test]
fn test_empty_tree() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_eq!(tree.get_value(&1).unwrap(), Vec::<i64>::new());
    assert!(tree.begin().unwrap().is_end());
    tree.remove(&1).unwrap();
}

#[test]
fn test_insert_and_search() {
    // leaf_max_size = internal_max_size = 4, keys inserted out of order.
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    for key in [5, 3, 8, 1, 4, 9, 2, 7, 6] {
        assert!(tree.insert(key, key).unwrap());
    }

    assert_eq!(tree.get_value(&7).unwrap(), vec![7]);
    assert_eq!(tree.get_value(&10).unwrap(), Vec::<i64>::new());
    assert_eq!(collect_keys(&tree), (1..=9).collect::<Vec<_>>());
}

#[test]
fn test_duplicate_insert_rejected() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    assert!(tree.insert(42, 1).unwrap());
    assert!(!tree.insert(42, 2).unwrap());
    // The original value survives.
    assert_eq!(tree.get_value(&42).unwrap(), vec![1]);
}

#[test]
fn test_split_propagates_to_root() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    for key in [5, 3, 8, 1, 4, 9, 2, 7, 6] {
        tree.insert(key, key).unwrap();
    }
    let root_after_nine = tree.root_page_id();

    for key in [10, 11, 12, 13] {
        tree.insert(key, key).unwrap();
    }

    // The root moved at least once as the tree grew levels.
    assert_ne!(tree.root_page_id(), INVALID_PAGE_ID);
    assert_ne!(tree.root_page_id(), root_after_nine);

    for key in 1..=13 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![key], "key {key} lost");
    }
    let keys = collect_keys(&tree);
    assert_eq!(keys, (1..=13).collect::<Vec<_>>());
    assert_sorted_unique(&keys);
}

#[test]
fn test_delete_underflow_and_merge() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    for key in [5, 3, 8, 1, 4, 9, 2, 7, 6, 10, 11, 12, 13] {
        tree.insert(key, key).unwrap();
    }

    // Remove the low half one by one; order and residency must hold
    // after every step.
    let mut expected: Vec<i64> = (1..=13).collect();
    for key in 1..=7 {
        tree.remove(&key).unwrap();
        expected.retain(|&k| k != key);
        let keys = collect_keys(&tree);
        assert_eq!(keys, expected, "after removing {key}");
        assert_sorted_unique(&keys);
    }

    for key in 8..=13 {
        tree.remove(&key).unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
}

#[test]
fn test_remove_is_idempotent() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    tree.insert(1, 1).unwrap();
    tree.insert(2, 2).unwrap();

    tree.remove(&1).unwrap();
    tree.remove(&1).unwrap();
    assert_eq!(collect_keys(&tree), vec![2]);
}

#[test]
fn test_random_order_round_trip() {
    let (tree, _bpm, _temp) = create_tree(64, 4, 4);

    // A fixed pseudo-random permutation of 0..200.
    let mut keys: Vec<i64> = (0..200).collect();
    let mut state = 0x9E3779B9u64;
    for i in (1..keys.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        keys.swap(i, j);
    }

    for &key in &keys {
        assert!(tree.insert(key, key * 3).unwrap());
    }
    let scanned = collect_keys(&tree);
    assert_eq!(scanned, (0..200).collect::<Vec<_>>());

    // Delete in a different order and verify emptiness.
    keys.reverse();
    for &key in &keys {
        tree.remove(&key).unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
}

#[test]
fn test_begin_at() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    for key in (0..40).step_by(2) {
        tree.insert(key, key).unwrap();
    }

    // Exact hit.
    let from_ten: Vec<i64> = tree.begin_at(&10).unwrap().map(|i| i.unwrap().0).collect();
    assert_eq!(from_ten, (10..40).step_by(2).collect::<Vec<_>>());

    // Between keys: starts at the next larger one.
    let from_eleven: Vec<i64> = tree.begin_at(&11).unwrap().map(|i| i.unwrap().0).collect();
    assert_eq!(from_eleven, (12..40).step_by(2).collect::<Vec<_>>());

    // Past the end.
    assert!(tree.begin_at(&100).unwrap().is_end());
}

#[test]
fn test_iterator_equality() {
    let (tree, _bpm, _temp) = create_tree(16, 4, 4);

    for key in 0..10 {
        tree.insert(key, key).unwrap();
    }

    let a = tree.begin().unwrap();
    let b = tree.begin().unwrap();
    assert!(a == b);

    let mut c = tree.begin().unwrap();
    c.advance().unwrap();
    assert!(a != c);

    let mut d = tree.begin().unwrap();
    while !d.is_end() {
        d.advance().unwrap();
    }
    assert!(d == tree.end());
}

#[test]
fn test_root_id_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, 2, dm));
        let tree: IntTree =
            BPlusTree::new("persisted", Arc::clone(&bpm), OrdComparator, 4, 4);
        for key in 0..30 {
            tree.insert(key, key + 1000).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(16, 2, dm));
    let tree: IntTree =
        BPlusTree::open("persisted", Arc::clone(&bpm), OrdComparator, 4, 4).unwrap();

    assert!(!tree.is_empty());
    for key in 0..30 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![key + 1000]);
    }
}

#[test]
fn test_small_pool_forces_eviction_through_index() {
    // Five frames is far less than the tree's page count; index reads
    // and writes must survive constant eviction traffic.
    let (tree, _bpm, _temp) = create_tree(5, 4, 4);

    for key in 0..100 {
        tree.insert(key, key).unwrap();
    }
    for key in 0..100 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![key]);
    }
    assert_eq!(collect_keys(&tree), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_inserts() {
    let (tree, _bpm, _temp) = create_tree(64, 4, 4);
    let tree = Arc::new(tree);

    let mut handles = Vec::new();
    for t in 0i64..4 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            // Interleaved key ranges so threads collide on the same leaves.
            let mut key = t;
            while key < 400 {
                assert!(tree.insert(key, key * 2).unwrap());
                key += 4;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let keys = collect_keys(&tree);
    assert_eq!(keys, (0..400).collect::<Vec<_>>());
    for key in 0..400 {
        assert_eq!(tree.get_value(&key).unwrap(), vec![key * 2]);
    }
}

#[test]
fn test_concurrent_readers_during_inserts() {
    let (tree, _bpm, _temp) = create_tree(64, 8, 8);
    let tree = Arc::new(tree);

    for key in 0..100 {
        tree.insert(key, key).unwrap();
    }

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for key in 100..300 {
                tree.insert(key, key).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..50 {
                    // Pre-existing keys stay visible throughout.
                    for key in (0..100).step_by(7) {
                        assert_eq!(tree.get_value(&key).unwrap(), vec![key]);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(collect_keys(&tree), (0..300).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_deletes() {
    let (tree, _bpm, _temp) = create_tree(64, 4, 4);
    let tree = Arc::new(tree);

    for key in 0..400 {
        tree.insert(key, key).unwrap();
    }

    let mut handles = Vec::new();
    for t in 0i64..4 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut key = t;
            while key < 400 {
                tree.remove(&key).unwrap();
                key += 4;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
}

#[test]
fn test_header_record_tracks_root() {
    let (tree, bpm, _temp) = create_tree(16, 4, 4);

    tree.insert(1, 1).unwrap();
    let first_root = tree.root_page_id();
    assert_ne!(first_root, INVALID_PAGE_ID);

    // The header page record follows every root change.
    let read_recorded_root = |bpm: &Arc<BufferPoolManager>| -> PageId {
        let guard = bpm.fetch_page_read(burrow::common::HEADER_PAGE_ID).unwrap();
        burrow::storage::page::HeaderPageRef::new(guard.data())
            .get_root_id("test_index")
            .unwrap()
    };
    assert_eq!(read_recorded_root(&bpm), first_root);

    for key in 2..=20 {
        tree.insert(key, key).unwrap();
    }
    assert_eq!(read_recorded_root(&bpm), tree.root_page_id());

    for key in 1..=20 {
        tree.remove(&key).unwrap();
    }
    assert_eq!(read_recorded_root(&bpm), INVALID_PAGE_ID);
}
