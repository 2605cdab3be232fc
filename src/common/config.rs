use super::error::{Result, StoreError};

/// Default size of a page's record area in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool size (number of resident pages)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Smallest usable pool: a split keeps the source page and the spawned page resident
pub const MIN_BUFFER_POOL_SIZE: usize = 2;

/// Depth of the disk scheduler request queue
pub const DISK_QUEUE_DEPTH: usize = 128;

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    page_size: usize,
    max_pages: usize,
}

impl EngineConfig {
    /// Creates a configuration with the default page size and pool size.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_BUFFER_POOL_SIZE,
        }
    }

    /// Sets the page size in bytes.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the maximum number of resident pages.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    pub fn get_max_pages(&self) -> usize {
        self.max_pages
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(StoreError::InvalidConfig("page size must be non-zero".into()));
        }
        if self.max_pages < MIN_BUFFER_POOL_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "buffer pool needs at least {} pages, got {}",
                MIN_BUFFER_POOL_SIZE, self.max_pages
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
