use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{BurrowError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request with an owned buffer. Reads hand the filled buffer
/// back through the completion channel; writes consume theirs.
enum DiskRequest {
    Read {
        page_id: PageId,
        buf: PageBuf,
        done: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        buf: PageBuf,
        done: Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker
/// thread. The buffer pool only uses the synchronous wrappers, but the
/// queue keeps request ordering deterministic and keeps file-cursor
/// contention off the callers.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread over the given disk manager.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    fn run_worker(dm: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        // The loop ends when the sender side is dropped.
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Read {
                    page_id,
                    mut buf,
                    done,
                } => {
                    let result = dm.read_page(page_id, &mut buf[..]).map(|()| buf);
                    let _ = done.send(result);
                }
                DiskRequest::Write { page_id, buf, done } => {
                    let _ = done.send(dm.write_page(page_id, &buf[..]));
                }
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn sender(&self) -> &Sender<DiskRequest> {
        self.request_sender
            .as_ref()
            .expect("scheduler already shut down")
    }

    /// Schedules a read and blocks until the page is in `data`.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.sender()
            .send(DiskRequest::Read {
                page_id,
                buf: Box::new([0u8; PAGE_SIZE]),
                done: tx,
            })
            .map_err(|e| BurrowError::DiskScheduler(format!("failed to queue read: {e}")))?;

        let buf = rx
            .recv()
            .map_err(|e| BurrowError::DiskScheduler(format!("read completion lost: {e}")))??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Schedules a write and blocks until it has reached the file.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = bounded(1);
        self.sender()
            .send(DiskRequest::Write {
                page_id,
                buf,
                done: tx,
            })
            .map_err(|e| BurrowError::DiskScheduler(format!("failed to queue write: {e}")))?;

        rx.recv()
            .map_err(|e| BurrowError::DiskScheduler(format!("write completion lost: {e}")))?
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the channel stops the worker; join so queued writes land
        // before the disk manager goes away.
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
