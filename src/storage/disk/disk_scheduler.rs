use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::trace;

use crate::common::{PageKey, Result, StoreError, DISK_QUEUE_DEPTH};

use super::DiskManager;

/// A disk I/O request. Each request carries its own completion channel.
pub enum DiskRequest {
    Read {
        key: PageKey,
        reply: Sender<Result<Option<Bytes>>>,
    },
    Write {
        key: PageKey,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

/// Completion handle for a scheduled request
pub struct Pending<T> {
    key: PageKey,
    receiver: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub fn key(&self) -> PageKey {
        self.key
    }

    /// Blocks until the worker has processed the request.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|e| {
            StoreError::DiskScheduler(format!("no completion for {}: {}", self.key, e))
        })?
    }
}

/// DiskScheduler runs page I/O on a background worker thread fed by a request queue.
///
/// Callers either wait on each request (`read_sync`, `write_sync`) or submit a
/// batch with `schedule_write` and wait on the returned handles afterwards.
pub struct DiskScheduler {
    /// Request queue; dropped on shutdown so the worker drains and exits
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Result<Self> {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_QUEUE_DEPTH);
        let worker_handle = thread::Builder::new()
            .name("pagestore-disk".into())
            .spawn(move || Self::run_worker(disk_manager, receiver))?;

        Ok(Self {
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        })
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| StoreError::DiskScheduler("scheduler is shut down".into()))?;
        sender
            .send(request)
            .map_err(|e| StoreError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Queues a page read.
    pub fn schedule_read(&self, key: PageKey) -> Result<Pending<Option<Bytes>>> {
        let (reply, receiver) = bounded(1);
        self.schedule(DiskRequest::Read { key, reply })?;
        Ok(Pending { key, receiver })
    }

    /// Queues a page write.
    pub fn schedule_write(&self, key: PageKey, data: Bytes) -> Result<Pending<()>> {
        let (reply, receiver) = bounded(1);
        self.schedule(DiskRequest::Write { key, data, reply })?;
        Ok(Pending { key, receiver })
    }

    /// Reads a page and waits for the result.
    pub fn read_sync(&self, key: PageKey) -> Result<Option<Bytes>> {
        self.schedule_read(key)?.wait()
    }

    /// Writes a page and waits until it is durable.
    pub fn write_sync(&self, key: PageKey, data: Bytes) -> Result<()> {
        self.schedule_write(key, data)?.wait()
    }

    /// Processes requests until every sender is gone.
    fn run_worker(disk_manager: Arc<dyn DiskManager>, receiver: Receiver<DiskRequest>) {
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Read { key, reply } => {
                    trace!(%key, "disk read");
                    let _ = reply.send(disk_manager.read_page(key));
                }
                DiskRequest::Write { key, data, reply } => {
                    trace!(%key, bytes = data.len(), "disk write");
                    let _ = reply.send(disk_manager.write_page(key, &data));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish queued requests and exit
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
