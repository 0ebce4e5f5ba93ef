//! Burrow - the storage engine core of a disk-oriented database
//!
//! Burrow mediates between a fixed pool of in-memory frames and durable
//! page storage, and builds a concurrent B+-tree index on top. Higher
//! layers see pinned page access through RAII guards; correctness under
//! concurrent readers and writers comes from a pin/latch discipline
//! shared by three interlocking subsystems:
//!
//! - **Container** (`container`): a generic extendible hash table with
//!   bucket-level splitting, used by the buffer pool as its page table
//!   (page id -> frame id) and usable standalone.
//!
//! - **Buffer pool** (`buffer`): fixed frames with pin counts and dirty
//!   bits, an LRU-K replacer choosing eviction victims by backward
//!   k-distance, and page guards that unpin (and unlatch) on drop.
//!
//! - **Index** (`index`): a latch-crabbing B+-tree over buffer-managed
//!   pages with point lookup, ordered iteration, insert with splits, and
//!   delete with redistribute-or-merge, generic over key, value, and an
//!   injected comparator.
//!
//! The storage layer (`storage`) supplies the disk manager, a background
//! disk scheduler, and the header page that persists index roots.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use burrow::buffer::BufferPoolManager;
//! use burrow::index::{BPlusTree, OrdComparator};
//! use burrow::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let tree: BPlusTree<i64, i64, _> =
//!     BPlusTree::new("demo_index", Arc::clone(&bpm), OrdComparator, 32, 32);
//! tree.insert(1, 100).unwrap();
//! assert_eq!(tree.get_value(&1).unwrap(), vec![100]);
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{BurrowError, FrameId, PageId, RecordId, Result};
