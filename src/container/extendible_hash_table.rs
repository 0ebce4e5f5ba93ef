use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

use parking_lot::Mutex;

/// A bucket holds up to `bucket_size` items in insertion order, plus the
/// number of hash bits (`local_depth`) that all of its items agree on.
struct Bucket<K, V> {
    items: Vec<(K, V)>,
    local_depth: usize,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            items: Vec::new(),
            local_depth,
        }
    }
}

struct Directory<K, V> {
    /// Directory slots index into `buckets`; several slots may share one
    /// bucket when its local depth is below the global depth.
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    global_depth: usize,
    num_entries: usize,
}

/// ExtendibleHashTable is a thread-safe, in-memory map with bucket-level
/// splitting. The buffer pool uses it as its page table (page id -> frame
/// id), but it works for any hashable key.
///
/// The hasher is injected so callers with special distribution needs (or
/// tests that want a deterministic `hash(x) = x`) can supply their own,
/// in the same way `HashMap` takes a `BuildHasher`.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hasher: S,
    dir: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single depth-0 bucket of the given capacity.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        let dir = Directory {
            slots: vec![0],
            buckets: vec![Bucket::new(0)],
            global_depth: 0,
            num_entries: 0,
        };
        Self {
            bucket_size,
            hasher,
            dir: Mutex::new(dir),
        }
    }

    fn hash_of(&self, key: &K) -> usize {
        let mut h = self.hasher.build_hasher();
        key.hash(&mut h);
        h.finish() as usize
    }

    /// Directory slot for a key at the current global depth.
    fn slot_of(&self, dir: &Directory<K, V>, key: &K) -> usize {
        let mask = (1usize << dir.global_depth) - 1;
        self.hash_of(key) & mask
    }

    /// Looks up the value associated with `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.lock();
        let bucket = &dir.buckets[dir.slots[self.slot_of(&dir, key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts a key-value pair, overwriting the value if the key already
    /// exists. Splits the target bucket (doubling the directory when its
    /// local depth has caught up with the global depth) until the item
    /// fits; a single split may not separate items that collide on the
    /// new bit, hence the retry loop.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.lock();

        loop {
            let slot = self.slot_of(&dir, &key);
            let bucket_idx = dir.slots[slot];

            {
                let bucket = &mut dir.buckets[bucket_idx];
                if let Some(item) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                    item.1 = value;
                    return;
                }
                if bucket.items.len() < self.bucket_size {
                    bucket.items.push((key, value));
                    dir.num_entries += 1;
                    return;
                }
            }

            // Full bucket: grow the directory if this bucket is the only
            // one at the maximum depth, then split it.
            if dir.buckets[bucket_idx].local_depth == dir.global_depth {
                let old_len = dir.slots.len();
                dir.slots.extend_from_within(0..old_len);
                dir.global_depth += 1;
            }
            self.split_bucket(&mut dir, bucket_idx);
        }
    }

    /// Splits one bucket: bump its local depth, allocate a sibling at the
    /// same depth, repartition its items on the new bit, and repoint every
    /// directory slot whose index has the split bit set.
    fn split_bucket(&self, dir: &mut Directory<K, V>, bucket_idx: usize) {
        dir.buckets[bucket_idx].local_depth += 1;
        let local_depth = dir.buckets[bucket_idx].local_depth;
        let split_bit = 1usize << (local_depth - 1);

        let moved: Vec<(K, V)> = {
            let bucket = &mut dir.buckets[bucket_idx];
            let items = std::mem::take(&mut bucket.items);
            let (stay, moved) = items
                .into_iter()
                .partition(|(k, _)| self.hash_of(k) & split_bit == 0);
            bucket.items = stay;
            moved
        };

        let new_idx = dir.buckets.len();
        let mut sibling = Bucket::new(local_depth);
        sibling.items = moved;
        dir.buckets.push(sibling);

        for (i, slot) in dir.slots.iter_mut().enumerate() {
            if *slot == bucket_idx && i & split_bit != 0 {
                *slot = new_idx;
            }
        }
    }

    /// Removes a key. Buckets are never merged back.
    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.dir.lock();
        let slot = self.slot_of(&dir, key);
        let bucket_idx = dir.slots[slot];
        let bucket = &mut dir.buckets[bucket_idx];
        if let Some(pos) = bucket.items.iter().position(|(k, _)| k == key) {
            bucket.items.remove(pos);
            dir.num_entries -= 1;
            true
        } else {
            false
        }
    }

    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    /// Local depth of the bucket behind the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let dir = self.dir.lock();
        dir.buckets[dir.slots[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().buckets.len()
    }

    pub fn len(&self) -> usize {
        self.dir.lock().num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hashes an integer to itself so the split arithmetic is observable.
    #[derive(Clone, Default)]
    pub struct IdentityState;

    #[derive(Default)]
    pub struct IdentityHasher(u64);

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

    fn identity_table(bucket_size: usize) -> ExtendibleHashTable<i32, String, IdentityState> {
        ExtendibleHashTable::with_hasher(bucket_size, IdentityState)
    }

    #[test]
    fn test_insert_find_remove() {
        let table = ExtendibleHashTable::new(4);
        table.insert(1, "a");
        table.insert(2, "b");

        assert_eq!(table.find(&1), Some("a"));
        assert_eq!(table.find(&2), Some("b"));
        assert_eq!(table.find(&3), None);

        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_overwrites() {
        let table = ExtendibleHashTable::new(2);
        table.insert(7, "x");
        table.insert(7, "y");
        assert_eq!(table.find(&7), Some("y"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_split_on_overflow() {
        // With hash(x) = x and bucket_size = 2: inserting 1, 2 fills the
        // sole depth-0 bucket, and 3 forces a split on bit 0. Evens stay
        // in slot 0, odds move to slot 1.
        let table = identity_table(2);
        table.insert(1, "a".to_string());
        table.insert(2, "b".to_string());
        table.insert(3, "c".to_string());

        assert_eq!(table.global_depth(), 1);
        assert_eq!(table.num_buckets(), 2);
        assert_eq!(table.local_depth(0), 1);
        assert_eq!(table.local_depth(1), 1);

        assert_eq!(table.find(&1), Some("a".to_string()));
        assert_eq!(table.find(&2), Some("b".to_string()));
        assert_eq!(table.find(&3), Some("c".to_string()));
    }

    #[test]
    fn test_repeated_splits() {
        // 0, 4, 8, 12 share the two low bits; separating them needs the
        // directory to double more than once.
        let table = identity_table(2);
        for k in [0, 4, 8, 12, 1, 2, 3] {
            table.insert(k, format!("v{k}"));
        }
        for k in [0, 4, 8, 12, 1, 2, 3] {
            assert_eq!(table.find(&k), Some(format!("v{k}")));
        }
        assert!(table.global_depth() >= 3);
    }

    #[test]
    fn test_directory_targets_bounded_by_buckets() {
        let table = identity_table(2);
        for k in 0..64 {
            table.insert(k, k.to_string());
        }
        let buckets = table.num_buckets();
        assert!(buckets <= 1 << table.global_depth());
        assert_eq!(table.len(), 64);
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();
        for t in 0..4 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..256 {
                    table.insert(t * 1000 + i, i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.len(), 4 * 256);
        for t in 0..4 {
            for i in 0..256 {
                assert_eq!(table.find(&(t * 1000 + i)), Some(i));
            }
        }
    }
}
