//! Integration tests for the extendible hash table

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::thread;

use burrow::container::ExtendibleHashTable;

/// Hashes an integer to itself, making directory arithmetic predictable.
#[derive(Clone, Default)]
struct IdentityState;

#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.0 = u64::from_le_bytes(buf);
    }
}

impl BuildHasher for IdentityState {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher::default()
    }
}

#[test]
fn test_first_split() {
    // bucket_size = 2, hash(x) = x. Keys 1 and 2 fill the sole depth-0
    // bucket; key 3 doubles the directory and splits on bit 0, leaving
    // even hashes in slot 0 and odd hashes in slot 1.
    let table: ExtendibleHashTable<i32, &str, _> = ExtendibleHashTable::with_hasher(2, IdentityState);

    table.insert(1, "a");
    table.insert(2, "b");
    table.insert(3, "c");

    assert_eq!(table.global_depth(), 1);
    assert_eq!(table.num_buckets(), 2);
    assert_eq!(table.local_depth(0), 1);
    assert_eq!(table.local_depth(1), 1);

    assert_eq!(table.find(&1), Some("a"));
    assert_eq!(table.find(&2), Some("b"));
    assert_eq!(table.find(&3), Some("c"));
}

#[test]
fn test_find_reflects_insert_and_remove() {
    let table = ExtendibleHashTable::new(4);

    for k in 0..200 {
        table.insert(k, k * 2);
    }
    for k in (0..200).step_by(2) {
        assert!(table.remove(&k));
    }

    for k in 0..200 {
        if k % 2 == 0 {
            assert_eq!(table.find(&k), None);
        } else {
            assert_eq!(table.find(&k), Some(k * 2));
        }
    }
    assert_eq!(table.len(), 100);
}

#[test]
fn test_directory_invariants_under_growth() {
    let table: ExtendibleHashTable<u64, u64, _> = ExtendibleHashTable::with_hasher(2, IdentityState);

    for k in 0..128 {
        table.insert(k, k);
    }

    // Distinct directory targets can never exceed the bucket count, and
    // the bucket count never exceeds the directory size.
    let buckets = table.num_buckets();
    let dir_size = 1usize << table.global_depth();
    assert!(buckets <= dir_size);
    for i in 0..dir_size {
        assert!(table.local_depth(i) <= table.global_depth());
    }
}

#[test]
fn test_overwrite_keeps_one_entry() {
    let table = ExtendibleHashTable::new(4);
    for _ in 0..10 {
        table.insert("key", 1);
    }
    table.insert("key", 2);
    assert_eq!(table.len(), 1);
    assert_eq!(table.find(&"key"), Some(2));
}

#[test]
fn test_concurrent_mixed_workload() {
    let table = Arc::new(ExtendibleHashTable::new(4));

    let mut handles = Vec::new();
    for t in 0i64..8 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            let base = t * 10_000;
            for i in 0..500 {
                table.insert(base + i, i);
            }
            for i in (0..500).step_by(3) {
                table.remove(&(base + i));
            }
            for i in 0..500 {
                let found = table.find(&(base + i));
                if i % 3 == 0 {
                    assert_eq!(found, None);
                } else {
                    assert_eq!(found, Some(i));
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}
