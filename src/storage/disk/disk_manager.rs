use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::{PageId, PageKey, Result, TableId};

/// Gateway to persisted pages and table metadata.
///
/// Implementations hold no page contents in memory on behalf of the engine;
/// caching is the buffer pool's job. A write that returns `Ok` must be visible
/// to the next read of the same key.
pub trait DiskManager: Send + Sync {
    /// Reads a page. Returns None if the page was never written or was deleted.
    fn read_page(&self, key: PageKey) -> Result<Option<Bytes>>;

    /// Writes a page, replacing any previous contents.
    fn write_page(&self, key: PageKey, data: &[u8]) -> Result<()>;

    /// Deletes a page. Returns true if it existed.
    fn delete_page(&self, key: PageKey) -> Result<bool>;

    /// Lists the ids of a table's persisted pages in ascending id order.
    fn list_page_ids(&self, table_id: TableId) -> Result<Vec<PageId>>;

    /// Reads a table's metadata blob.
    fn read_table_meta(&self, table_id: TableId) -> Result<Option<Bytes>>;

    /// Writes a table's metadata blob.
    fn write_table_meta(&self, table_id: TableId, data: &[u8]) -> Result<()>;

    /// Deletes a table's metadata blob. Returns true if it existed.
    fn delete_table_meta(&self, table_id: TableId) -> Result<bool>;

    /// Lists every table with a metadata blob, in ascending id order.
    fn list_table_ids(&self) -> Result<Vec<TableId>>;

    /// Removes every page and the metadata blob of a table.
    fn delete_table(&self, table_id: TableId) -> Result<()> {
        for page_id in self.list_page_ids(table_id)? {
            self.delete_page(PageKey::new(table_id, page_id))?;
        }
        self.delete_table_meta(table_id)?;
        Ok(())
    }
}

/// File-backed disk manager: one file per page and one per table's metadata.
///
/// ```text
/// <root>/table_<id>.meta
/// <root>/table_<id>/<page_id>.page
/// ```
pub struct FileDiskManager {
    /// Directory holding all table files
    root: PathBuf,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl FileDiskManager {
    /// Creates a disk manager rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table_id: TableId) -> PathBuf {
        self.root.join(format!("table_{}", table_id.as_u32()))
    }

    fn page_path(&self, key: PageKey) -> PathBuf {
        self.table_dir(key.table_id)
            .join(format!("{}.page", key.page_id.as_u32()))
    }

    fn meta_path(&self, table_id: TableId) -> PathBuf {
        self.root.join(format!("table_{}.meta", table_id.as_u32()))
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }
}

fn read_optional(path: &Path) -> Result<Option<Bytes>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_durable(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn remove_optional(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Collects the numeric ids of directory entries named `<prefix><id><suffix>`.
fn scan_ids(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<u32>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        let id = name
            .to_str()
            .and_then(|n| n.strip_prefix(prefix))
            .and_then(|n| n.strip_suffix(suffix))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(id) = id {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, key: PageKey) -> Result<Option<Bytes>> {
        let data = read_optional(&self.page_path(key))?;
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    fn write_page(&self, key: PageKey, data: &[u8]) -> Result<()> {
        fs::create_dir_all(self.table_dir(key.table_id))?;
        write_durable(&self.page_path(key), data)?;
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_page(&self, key: PageKey) -> Result<bool> {
        remove_optional(&self.page_path(key))
    }

    fn list_page_ids(&self, table_id: TableId) -> Result<Vec<PageId>> {
        Ok(scan_ids(&self.table_dir(table_id), "", ".page")?
            .into_iter()
            .map(PageId::new)
            .collect())
    }

    fn read_table_meta(&self, table_id: TableId) -> Result<Option<Bytes>> {
        read_optional(&self.meta_path(table_id))
    }

    fn write_table_meta(&self, table_id: TableId, data: &[u8]) -> Result<()> {
        write_durable(&self.meta_path(table_id), data)
    }

    fn delete_table_meta(&self, table_id: TableId) -> Result<bool> {
        remove_optional(&self.meta_path(table_id))
    }

    fn list_table_ids(&self) -> Result<Vec<TableId>> {
        Ok(scan_ids(&self.root, "table_", ".meta")?
            .into_iter()
            .map(TableId::new)
            .collect())
    }

    fn delete_table(&self, table_id: TableId) -> Result<()> {
        match fs::remove_dir_all(self.table_dir(table_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.delete_table_meta(table_id)?;
        Ok(())
    }
}

/// In-memory disk manager for tests and throwaway tables.
/// Writes can be made to fail on demand to exercise I/O error paths.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: Mutex<BTreeMap<PageKey, Bytes>>,
    metas: Mutex<BTreeMap<TableId, Bytes>>,
    fail_writes: AtomicBool,
    /// Writes still allowed before every further write fails
    write_budget: Mutex<Option<u32>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent page or metadata write fail with an I/O error.
    /// Turning failures off also clears any budget set by `fail_writes_after`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            *self.write_budget.lock() = None;
        }
    }

    /// Lets `count` more page or metadata writes succeed, then fails the rest.
    pub fn fail_writes_after(&self, count: u32) {
        *self.write_budget.lock() = Some(count);
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(ErrorKind::Other, "injected write failure").into());
        }
        match self.write_budget.lock().as_mut() {
            Some(0) => {
                Err(std::io::Error::new(ErrorKind::Other, "injected write failure").into())
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, key: PageKey) -> Result<Option<Bytes>> {
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.pages.lock().get(&key).cloned())
    }

    fn write_page(&self, key: PageKey, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.pages.lock().insert(key, Bytes::copy_from_slice(data));
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_page(&self, key: PageKey) -> Result<bool> {
        Ok(self.pages.lock().remove(&key).is_some())
    }

    fn list_page_ids(&self, table_id: TableId) -> Result<Vec<PageId>> {
        let pages = self.pages.lock();
        Ok(pages
            .keys()
            .filter(|key| key.table_id == table_id)
            .map(|key| key.page_id)
            .collect())
    }

    fn read_table_meta(&self, table_id: TableId) -> Result<Option<Bytes>> {
        Ok(self.metas.lock().get(&table_id).cloned())
    }

    fn write_table_meta(&self, table_id: TableId, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.metas.lock().insert(table_id, Bytes::copy_from_slice(data));
        Ok(())
    }

    fn delete_table_meta(&self, table_id: TableId) -> Result<bool> {
        Ok(self.metas.lock().remove(&table_id).is_some())
    }

    fn list_table_ids(&self) -> Result<Vec<TableId>> {
        Ok(self.metas.lock().keys().copied().collect())
    }
}
