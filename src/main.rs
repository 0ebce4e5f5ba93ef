use std::sync::Arc;

use burrow::buffer::BufferPoolManager;
use burrow::index::{BPlusTree, OrdComparator};
use burrow::storage::disk::DiskManager;
use burrow::RecordId;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Burrow - a disk-oriented storage engine core");
    println!("============================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {db_path}");

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool with 16 frames (LRU-2 replacement)\n");

    let tree: BPlusTree<i64, RecordId, _> =
        BPlusTree::new("demo_index", Arc::clone(&bpm), OrdComparator, 8, 8);

    // Insert a batch out of order; the index keeps them sorted.
    let keys = [42, 7, 19, 3, 88, 56, 21, 64, 10, 30, 75, 91, 5, 48, 2];
    for (slot, &key) in keys.iter().enumerate() {
        let rid = RecordId::new(burrow::PageId::new(100), slot as u32);
        tree.insert(key, rid).expect("insert failed");
    }
    println!("Inserted {} keys, root page: {}", keys.len(), tree.root_page_id());

    // Point lookups.
    for probe in [19, 88, 1000] {
        match tree.get_value(&probe).expect("lookup failed").first() {
            Some(rid) => println!("  key {probe:4} -> {rid}"),
            None => println!("  key {probe:4} -> (not found)"),
        }
    }

    // Ordered scan over the leaf chain.
    print!("\nKeys in order:");
    for item in tree.begin().expect("begin failed") {
        let (key, _) = item.expect("scan failed");
        print!(" {key}");
    }
    println!();

    // Delete a few and show the survivors.
    for key in [3, 42, 91] {
        tree.remove(&key).expect("remove failed");
    }
    print!("After deleting 3, 42, 91:");
    for item in tree.begin().expect("begin failed") {
        let (key, _) = item.expect("scan failed");
        print!(" {key}");
    }
    println!();

    bpm.flush_all_pages().expect("flush failed");
    println!("\nFlushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("Demo completed successfully!");
}
