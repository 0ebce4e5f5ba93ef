use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{
    BurrowError, FrameId, PageId, Result, PAGE_SIZE, PAGE_TABLE_BUCKET_SIZE,
};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, PinnedPage, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping behind the pool-wide mutex.
struct PoolInner {
    /// Frames never used or returned by delete_page
    free_list: VecDeque<FrameId>,
    /// Monotonic page id allocator; page 0 is the header page
    next_page_id: i32,
}

/// State shared between the manager and its page guards.
struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: resident page id -> frame id
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
    /// The pool-wide mutex. Held for the duration of every pool operation,
    /// disk I/O included; never while acquiring a page latch.
    inner: Mutex<PoolInner>,
}

impl BufferPoolState {
    /// Unpin path shared by the manager and the guard release callbacks.
    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _inner = self.inner.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager mediates between the fixed frame pool and durable
/// page storage. It serves pages through pinning RAII guards, evicts with
/// the LRU-K policy, maps residency through an extendible hash table, and
/// writes dirty pages back on eviction and on explicit flush.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool with `pool_size` frames and LRU-K history depth `k`.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(k, pool_size),
            inner: Mutex::new(PoolInner {
                free_list,
                // Page 0 is reserved for the header page.
                next_page_id: 1,
            }),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and returns it pinned and write-latched.
    /// The caller initializes the zeroed bytes behind the guard.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let (page_id, frame_id) = {
            let mut inner = self.state.inner.lock();
            let frame_id = self.acquire_frame(&mut inner)?;
            let page_id = self.allocate_page(&mut inner);

            let frame = &self.state.frames[frame_id.as_usize()];
            frame.reset();
            frame.set_page_id(page_id);
            frame.pin();

            self.state.page_table.insert(page_id, frame_id);
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);

            (page_id, frame_id)
        };
        trace!(page_id = page_id.as_i32(), "allocated new page");

        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Fetches a page for shared access, reading it from disk if it is
    /// not resident.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Fetches a page for exclusive access, reading it from disk if it is
    /// not resident.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Pins a page without latching it. The index iterator uses this to
    /// keep its current leaf resident between increments.
    pub fn pin_page(&self, page_id: PageId) -> Result<PinnedPage> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(PinnedPage::new(page_id, frame, self.release_callback()))
    }

    /// Drops one pin on a page, ORing in the dirty bit. Returns false if
    /// the page is not resident or was not pinned. Guards call this on
    /// drop; explicit callers are equally fine.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes a page to disk unconditionally and clears its dirty bit.
    /// Pin count and evictability are untouched. Returns false if the
    /// page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let _inner = self.state.inner.lock();
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Writes every resident page to disk, dirty or not, clearing dirty
    /// bits along the way.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.state.inner.lock();

        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if !page_id.is_valid() {
                continue;
            }
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Removes a page from the pool and deallocates it on disk. Returns
    /// false if the page is resident and pinned; a non-resident page is
    /// deallocated and reported deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            self.deallocate_page(page_id);
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        // remove() insists on evictable frames; a pin count of zero means
        // the unpin path already marked it, but make it so regardless.
        self.state.replacer.set_evictable(frame_id, true);
        self.state.replacer.remove(frame_id);
        self.state.page_table.remove(&page_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.deallocate_page(page_id);

        debug!(page_id = page_id.as_i32(), "deleted page");
        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _inner = self.state.inner.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    fn release_callback(&self) -> Box<dyn FnOnce(PageId, bool) + Send + Sync> {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            state.unpin(page_id, is_dirty);
        })
    }

    /// Pins `page_id` into a frame and returns the frame id. The caller
    /// latches after the pool mutex is released.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(BurrowError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            // The frame was never installed; hand it back.
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Obtains an empty frame: the free list first, then eviction. An
    /// evicted victim is written back if dirty and dropped from the page
    /// table before the frame is reused.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(BurrowError::BufferPoolFull);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let victim_page_id = frame.page_id();

        if victim_page_id.is_valid() {
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                if let Err(e) = self
                    .disk_scheduler
                    .schedule_write_sync(victim_page_id, &data)
                {
                    // Write-back failed: leave the victim resident and
                    // evictable rather than losing its bytes.
                    self.state.replacer.record_access(frame_id);
                    self.state.replacer.set_evictable(frame_id, true);
                    return Err(e);
                }
            }
            self.state.page_table.remove(&victim_page_id);
            trace!(
                victim = victim_page_id.as_i32(),
                frame = frame_id.as_u32(),
                "evicted page"
            );
        }

        frame.reset();
        Ok(frame_id)
    }

    /// Hands out the next page id. Disk space is implicit: pages are
    /// materialized by their first write-back.
    fn allocate_page(&self, inner: &mut PoolInner) -> PageId {
        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;
        page_id
    }

    /// Disk-side reclamation is out of scope; the id is simply retired.
    fn deallocate_page(&self, _page_id: PageId) {}
}
