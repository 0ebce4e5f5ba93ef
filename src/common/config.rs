use super::types::PageId;

/// Size of a page in bytes (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// Sentinel page id denoting absence
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// The reserved page that persists index-name -> root-page-id records
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K value for the LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Bucket capacity of the extendible hash table backing the page table
pub const PAGE_TABLE_BUCKET_SIZE: usize = 4;
