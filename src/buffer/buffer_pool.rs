use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::common::{PageId, PageKey, Result, StoreError, TableId, MIN_BUFFER_POOL_SIZE};
use crate::storage::disk::DiskScheduler;
use crate::storage::page::{Page, RecordPage};
use crate::tuple::TableSchema;

use super::LruReplacer;

/// A resident page together with what the pool needs to write it back
struct Frame {
    page: Page,
    /// Schema used to encode the page when it is flushed
    schema: Arc<TableSchema>,
    /// Number of callers currently holding the page
    pin_count: u32,
}

/// BufferPool keeps at most `max_pages` pages resident across all tables.
///
/// Pages come in either from disk (`fetch`) or freshly created (`register`).
/// Both first reserve a frame, evicting the least recently used unpinned
/// page and writing it back if dirty. A reservation that fails leaves the
/// pool unchanged, so callers can reserve before mutating anything.
pub struct BufferPool {
    /// Maximum number of resident pages
    max_pages: usize,
    /// Resident pages by key
    frames: HashMap<PageKey, Frame>,
    /// Eviction policy
    replacer: LruReplacer,
    /// All page I/O goes through the scheduler
    scheduler: DiskScheduler,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new(max_pages: usize, scheduler: DiskScheduler) -> Result<Self> {
        if max_pages < MIN_BUFFER_POOL_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "buffer pool needs at least {} pages, got {}",
                MIN_BUFFER_POOL_SIZE, max_pages
            )));
        }
        Ok(Self {
            max_pages,
            frames: HashMap::with_capacity(max_pages),
            replacer: LruReplacer::new(),
            scheduler,
        })
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Changes the capacity and evicts down to it.
    pub fn set_max_pages(&mut self, max_pages: usize) -> Result<()> {
        if max_pages < MIN_BUFFER_POOL_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "buffer pool needs at least {} pages, got {}",
                MIN_BUFFER_POOL_SIZE, max_pages
            )));
        }
        self.max_pages = max_pages;
        self.evict_if_needed()
    }

    pub fn scheduler(&self) -> &DiskScheduler {
        &self.scheduler
    }

    /// Returns the page, loading it from disk on a miss.
    ///
    /// A page missing on disk yields [`StoreError::PageNotFound`]; the pool
    /// is left unchanged in that case.
    pub fn fetch(&mut self, schema: &Arc<TableSchema>, page_id: PageId) -> Result<&mut Page> {
        let key = PageKey::new(schema.table_id(), page_id);

        if !self.frames.contains_key(&key) {
            self.reserve_frame()?;
            let data = self
                .scheduler
                .read_sync(key)?
                .ok_or(StoreError::PageNotFound(key))?;
            let page = RecordPage::decode(schema, page_id, &data)?;
            debug!(%key, "page loaded");
            self.admit(Page::Record(page), Arc::clone(schema));
        } else {
            self.touch(key);
        }

        self.frames
            .get_mut(&key)
            .map(|frame| &mut frame.page)
            .ok_or(StoreError::PageNotFound(key))
    }

    /// Returns a resident page without touching disk.
    pub fn get_mut(&mut self, key: PageKey) -> Option<&mut Page> {
        if !self.frames.contains_key(&key) {
            return None;
        }
        self.touch(key);
        self.frames.get_mut(&key).map(|frame| &mut frame.page)
    }

    /// Adds a newly created page, evicting if the pool is full.
    pub fn register(&mut self, schema: &Arc<TableSchema>, page: Page) -> Result<()> {
        let key = page.key();
        if self.frames.contains_key(&key) {
            return Err(StoreError::Corrupted(format!("{} is already resident", key)));
        }
        self.reserve_frame()?;
        debug!(%key, "page registered");
        self.admit(page, Arc::clone(schema));
        Ok(())
    }

    /// Evicts until one more page fits. Fails with
    /// [`StoreError::BufferPoolFull`] when every resident page is pinned.
    pub fn reserve_frame(&mut self) -> Result<()> {
        while self.frames.len() >= self.max_pages {
            self.evict_one()?;
        }
        Ok(())
    }

    /// Evicts until the pool is within its capacity.
    pub fn evict_if_needed(&mut self) -> Result<()> {
        while self.frames.len() > self.max_pages {
            self.evict_one()?;
        }
        Ok(())
    }

    /// Pins a resident page so it cannot be evicted.
    pub fn pin(&mut self, key: PageKey) -> Result<()> {
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or(StoreError::PageNotFound(key))?;
        frame.pin_count += 1;
        self.replacer.set_evictable(key, false);
        Ok(())
    }

    /// Releases one pin. Returns the remaining pin count.
    pub fn unpin(&mut self, key: PageKey) -> Result<u32> {
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or(StoreError::PageNotFound(key))?;
        frame.pin_count = frame.pin_count.saturating_sub(1);
        if frame.pin_count == 0 {
            self.replacer.set_evictable(key, true);
        }
        Ok(frame.pin_count)
    }

    pub fn mark_dirty(&mut self, key: PageKey) -> Result<()> {
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or(StoreError::PageNotFound(key))?;
        frame.page.set_dirty(true);
        Ok(())
    }

    /// Writes one resident page if it is dirty. Returns true if it was written.
    pub fn flush_page(&mut self, key: PageKey) -> Result<bool> {
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or(StoreError::PageNotFound(key))?;
        if !frame.page.is_dirty() {
            return Ok(false);
        }
        let data = frame.page.encode(&frame.schema)?;
        self.scheduler.write_sync(key, data)?;
        frame.page.set_dirty(false);
        Ok(true)
    }

    /// Writes every dirty page, keeping them resident. Writes are queued as a
    /// batch and awaited together; pages whose write succeeded are marked
    /// clean even if another write fails.
    pub fn flush_dirty(&mut self) -> Result<usize> {
        let mut pending = Vec::new();
        let mut first_error = None;

        for (key, frame) in &self.frames {
            if !frame.page.is_dirty() {
                continue;
            }
            let scheduled = frame
                .page
                .encode(&frame.schema)
                .and_then(|data| self.scheduler.schedule_write(*key, data));
            match scheduled {
                Ok(handle) => pending.push(handle),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut written = 0;
        for handle in pending {
            let key = handle.key();
            match handle.wait() {
                Ok(()) => {
                    if let Some(frame) = self.frames.get_mut(&key) {
                        frame.page.set_dirty(false);
                    }
                    written += 1;
                }
                Err(e) => {
                    warn!(%key, error = %e, "page flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Writes every dirty page and then empties the pool. On a write failure
    /// the pool keeps its pages so nothing unwritten is lost.
    pub fn flush_all(&mut self) -> Result<()> {
        let written = self.flush_dirty()?;
        debug!(written, resident = self.frames.len(), "buffer pool flushed");
        for key in self.frames.keys() {
            self.replacer.remove(*key);
        }
        self.frames.clear();
        Ok(())
    }

    /// Drops every resident page of a table without writing it back.
    pub fn discard_table(&mut self, table_id: TableId) -> usize {
        let keys: Vec<PageKey> = self
            .frames
            .keys()
            .filter(|key| key.table_id == table_id)
            .copied()
            .collect();
        for key in &keys {
            self.frames.remove(key);
            self.replacer.remove(*key);
        }
        keys.len()
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.frames.contains_key(&key)
    }

    /// Number of resident pages
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn pin_count(&self, key: PageKey) -> Option<u32> {
        self.frames.get(&key).map(|frame| frame.pin_count)
    }

    pub fn is_dirty(&self, key: PageKey) -> Option<bool> {
        self.frames.get(&key).map(|frame| frame.page.is_dirty())
    }

    fn touch(&mut self, key: PageKey) {
        self.replacer.record_access(key);
    }

    fn admit(&mut self, page: Page, schema: Arc<TableSchema>) {
        let key = page.key();
        self.frames.insert(
            key,
            Frame {
                page,
                schema,
                pin_count: 0,
            },
        );
        self.replacer.record_access(key);
        self.replacer.set_evictable(key, true);
    }

    /// Evicts the least recently used unpinned page, writing it back first
    /// if it is dirty. A failed write puts the victim back.
    fn evict_one(&mut self) -> Result<()> {
        let key = self.replacer.evict().ok_or(StoreError::BufferPoolFull)?;

        let write_back = match self.frames.get(&key) {
            Some(frame) if frame.page.is_dirty() => frame
                .page
                .encode(&frame.schema)
                .and_then(|data| self.scheduler.write_sync(key, data)),
            _ => Ok(()),
        };

        if let Err(e) = write_back {
            warn!(%key, error = %e, "eviction write-back failed");
            self.replacer.record_access(key);
            self.replacer.set_evictable(key, true);
            return Err(e);
        }

        self.frames.remove(&key);
        debug!(%key, "page evicted");
        Ok(())
    }
}
