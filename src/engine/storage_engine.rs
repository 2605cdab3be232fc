use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::common::{EngineConfig, PageId, PageKey, Result, StoreError, TableId};
use crate::storage::disk::{DiskManager, DiskScheduler, MemoryDiskManager};
use crate::storage::page::{format_key, RecordPage};
use crate::tuple::{DataType, TableSchema, Tuple, Value};

use super::TableMeta;

/// Everything guarded by the engine lock
struct EngineState {
    config: EngineConfig,
    tables: BTreeMap<TableId, TableMeta>,
    pool: BufferPool,
    disk: Arc<dyn DiskManager>,
}

/// StorageEngine is the record-level entry point.
///
/// It owns one [`TableMeta`] per table and a shared [`BufferPool`]. Each
/// call takes the engine lock for its whole duration, so record operations
/// run one at a time and a page is never observed half-modified.
///
/// Pages are located by key, not by id: the table's page directory keeps
/// its pages in ascending key order and lookups binary search it using
/// page bounds.
pub struct StorageEngine {
    state: Mutex<EngineState>,
}

impl StorageEngine {
    /// Opens an engine over `disk`, loading every table persisted there.
    pub fn open(disk: Arc<dyn DiskManager>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = DiskScheduler::new(Arc::clone(&disk))?;
        let pool = BufferPool::new(config.get_max_pages(), scheduler)?;

        let mut state = EngineState {
            config,
            tables: BTreeMap::new(),
            pool,
            disk,
        };
        state.load_tables()?;

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Opens an engine backed by memory only.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::open(Arc::new(MemoryDiskManager::new()), config)
    }

    pub fn config(&self) -> EngineConfig {
        self.state.lock().config
    }

    /// Registers a new table. The key is formed by the attributes at
    /// `key_positions`, compared in the order given.
    pub fn create_table(
        &self,
        table_id: TableId,
        attributes: Vec<DataType>,
        key_positions: Vec<usize>,
    ) -> Result<Arc<TableSchema>> {
        self.state
            .lock()
            .create_table(table_id, attributes, key_positions)
    }

    /// Removes a table with all of its pages and its meta blob.
    pub fn drop_table(&self, table_id: TableId) -> Result<()> {
        self.state.lock().drop_table(table_id)
    }

    /// Inserts a record, splitting its page if it is full.
    pub fn insert_record(&self, table_id: TableId, tuple: Tuple) -> Result<()> {
        self.state.lock().insert_record(table_id, tuple)
    }

    /// Looks up a record by its key values, given in key order.
    pub fn get_record(&self, table_id: TableId, key: &[Value]) -> Result<Tuple> {
        self.state.lock().get_record(table_id, key)
    }

    /// Replaces the record with the same key and returns the previous one.
    pub fn update_record(&self, table_id: TableId, tuple: Tuple) -> Result<Tuple> {
        self.state.lock().update_record(table_id, tuple)
    }

    /// Removes the record with the given key and returns it.
    pub fn remove_record(&self, table_id: TableId, key: &[Value]) -> Result<Tuple> {
        self.state.lock().remove_record(table_id, key)
    }

    /// Removes every record of a table, keeping the table itself.
    pub fn clear_table(&self, table_id: TableId) -> Result<()> {
        self.state.lock().clear_table(table_id)
    }

    /// Returns every record of a table in ascending key order.
    pub fn scan_table(&self, table_id: TableId) -> Result<Vec<Tuple>> {
        self.state.lock().scan_table(table_id)
    }

    /// Appends an attribute, filling existing records with `default`.
    pub fn add_attribute(&self, table_id: TableId, data_type: DataType, default: Value) -> Result<()> {
        self.state
            .lock()
            .add_attribute(table_id, data_type, default)
    }

    /// Removes a non-key attribute from every record.
    pub fn drop_attribute(&self, table_id: TableId, position: usize) -> Result<()> {
        self.state.lock().drop_attribute(table_id, position)
    }

    /// Writes dirty pages and table metas, keeping pages resident.
    pub fn flush(&self) -> Result<()> {
        self.state.lock().flush()
    }

    /// Writes dirty pages and table metas, then empties the buffer pool.
    pub fn shutdown(&self) -> Result<()> {
        self.state.lock().shutdown()
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<TableSchema>> {
        let state = self.state.lock();
        Ok(Arc::clone(state.table(table_id)?.schema()))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.state.lock().tables.keys().copied().collect()
    }

    /// Returns the table's page ids in key order.
    pub fn page_ids(&self, table_id: TableId) -> Result<Vec<PageId>> {
        let state = self.state.lock();
        Ok(state.table(table_id)?.directory().to_vec())
    }

    pub fn page_count(&self, table_id: TableId) -> Result<usize> {
        let state = self.state.lock();
        Ok(state.table(table_id)?.directory().len())
    }

    pub fn record_count(&self, table_id: TableId) -> Result<usize> {
        self.state.lock().record_count(table_id)
    }

    /// Number of pages currently held by the buffer pool
    pub fn resident_count(&self) -> usize {
        self.state.lock().pool.len()
    }

    pub fn is_resident(&self, key: PageKey) -> bool {
        self.state.lock().pool.contains(key)
    }

    pub fn pin_count(&self, key: PageKey) -> Option<u32> {
        self.state.lock().pool.pin_count(key)
    }

    pub fn is_dirty(&self, key: PageKey) -> Option<bool> {
        self.state.lock().pool.is_dirty(key)
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().shutdown() {
            warn!(error = %e, "flush on drop failed");
        }
    }
}

impl EngineState {
    fn table(&self, table_id: TableId) -> Result<&TableMeta> {
        self.tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))
    }

    /// Loads every persisted table, rebuilding page directories that do not
    /// match the pages on disk.
    fn load_tables(&mut self) -> Result<()> {
        for table_id in self.disk.list_table_ids()? {
            let data = self.disk.read_table_meta(table_id)?.ok_or_else(|| {
                StoreError::Corrupted(format!("{} has no meta blob", table_id))
            })?;
            let mut meta = TableMeta::deserialize(&data)?;
            if meta.schema().table_id() != table_id {
                return Err(StoreError::Corrupted(format!(
                    "meta blob of {} describes {}",
                    table_id,
                    meta.schema().table_id()
                )));
            }

            let listed = self.disk.list_page_ids(table_id)?;
            let mut recorded = meta.directory().to_vec();
            recorded.sort();
            if recorded != listed {
                warn!(
                    %table_id,
                    recorded = recorded.len(),
                    listed = listed.len(),
                    "page directory out of date, rebuilding"
                );
                let schema = Arc::clone(meta.schema());
                let directory = rebuild_directory(&mut self.pool, &schema, &listed)?;
                meta.set_directory(directory);
                self.disk.write_table_meta(table_id, &meta.serialize())?;
            }

            info!(%table_id, pages = meta.directory().len(), "table loaded");
            self.tables.insert(table_id, meta);
        }
        Ok(())
    }

    fn create_table(
        &mut self,
        table_id: TableId,
        attributes: Vec<DataType>,
        key_positions: Vec<usize>,
    ) -> Result<Arc<TableSchema>> {
        if self.tables.contains_key(&table_id) {
            return Err(StoreError::TableAlreadyExists(table_id));
        }
        let schema = TableSchema::new(
            table_id,
            attributes,
            key_positions,
            self.config.get_page_size(),
        )?;
        let meta = TableMeta::new(schema);
        self.disk.write_table_meta(table_id, &meta.serialize())?;

        let schema = Arc::clone(meta.schema());
        info!(
            %table_id,
            record_width = schema.record_width(),
            records_per_page = schema.max_records_per_page(),
            "table created"
        );
        self.tables.insert(table_id, meta);
        Ok(schema)
    }

    fn drop_table(&mut self, table_id: TableId) -> Result<()> {
        self.table(table_id)?;
        let discarded = self.pool.discard_table(table_id);
        self.disk.delete_table(table_id)?;
        self.tables.remove(&table_id);
        info!(%table_id, discarded, "table dropped");
        Ok(())
    }

    fn insert_record(&mut self, table_id: TableId, tuple: Tuple) -> Result<()> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get_mut(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;
        let schema = Arc::clone(meta.schema());
        let tuple = schema.validate(&tuple)?;
        let key = schema.key_of(&tuple);

        let Some(index) = route_insert(pool, &schema, meta.directory(), &key)? else {
            // first record of an empty table
            let page_id = meta.allocate_page_id();
            let mut page = RecordPage::new(&schema, page_id);
            page.insert(&schema, tuple)?;
            pool.register(&schema, page.into())?;
            meta.push_page(page_id);
            return Ok(());
        };

        let page_id = meta.directory()[index];
        let page = pool.fetch(&schema, page_id)?.as_record_mut()?;
        if page.has_space() {
            page.insert(&schema, tuple)?;
            return Ok(());
        }
        if page.find(&schema, &key).is_some() {
            return Err(StoreError::DuplicateKey(format_key(&key)));
        }

        let page_key = PageKey::new(table_id, page_id);
        pool.pin(page_key)?;
        let result = split_and_insert(pool, meta, &schema, index, tuple, &key);
        pool.unpin(page_key)?;
        result
    }

    fn get_record(&mut self, table_id: TableId, key: &[Value]) -> Result<Tuple> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;
        let schema = meta.schema();
        let key = schema.validate_key(key)?;

        let page_id =
            locate(pool, schema, meta.directory(), &key)?.ok_or(StoreError::RecordNotFound)?;
        pool.fetch(schema, page_id)?
            .as_record()?
            .get_record(schema, &key)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    fn update_record(&mut self, table_id: TableId, tuple: Tuple) -> Result<Tuple> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;
        let schema = meta.schema();
        let tuple = schema.validate(&tuple)?;
        let key = schema.key_of(&tuple);

        let page_id =
            locate(pool, schema, meta.directory(), &key)?.ok_or(StoreError::RecordNotFound)?;
        pool.fetch(schema, page_id)?
            .as_record_mut()?
            .update(schema, &key, tuple)
    }

    fn remove_record(&mut self, table_id: TableId, key: &[Value]) -> Result<Tuple> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;
        let schema = meta.schema();
        let key = schema.validate_key(key)?;

        let page_id =
            locate(pool, schema, meta.directory(), &key)?.ok_or(StoreError::RecordNotFound)?;
        pool.fetch(schema, page_id)?
            .as_record_mut()?
            .delete(schema, &key)
    }

    fn clear_table(&mut self, table_id: TableId) -> Result<()> {
        let EngineState {
            tables, pool, disk, ..
        } = self;
        let meta = tables
            .get_mut(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;

        // the empty meta is the commit point; nothing changes if it fails
        let mut cleared = meta.clone();
        cleared.reset();
        disk.write_table_meta(table_id, &cleared.serialize())?;

        let old = std::mem::replace(meta, cleared);
        pool.discard_table(table_id);
        remove_page_files(disk.as_ref(), table_id, old.directory());

        info!(%table_id, pages = old.directory().len(), "table cleared");
        Ok(())
    }

    fn scan_table(&mut self, table_id: TableId) -> Result<Vec<Tuple>> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;

        let mut tuples = Vec::new();
        for &page_id in meta.directory() {
            let page = pool.fetch(meta.schema(), page_id)?.as_record()?;
            tuples.extend(page.entries().iter().cloned());
        }
        Ok(tuples)
    }

    fn record_count(&mut self, table_id: TableId) -> Result<usize> {
        let EngineState { tables, pool, .. } = self;
        let meta = tables
            .get(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;

        let mut count = 0;
        for &page_id in meta.directory() {
            count += pool.fetch(meta.schema(), page_id)?.as_record()?.occupied_count();
        }
        Ok(count)
    }

    fn add_attribute(&mut self, table_id: TableId, data_type: DataType, default: Value) -> Result<()> {
        let schema = self.table(table_id)?.schema().with_attribute_added(data_type)?;
        let default = schema.validate_value(schema.attribute_count() - 1, &default)?;

        let tuples = self
            .scan_table(table_id)?
            .into_iter()
            .map(|tuple| {
                let mut values = tuple.into_values();
                values.push(default.clone());
                Tuple::new(values)
            })
            .collect();
        self.repaginate(table_id, schema, tuples)
    }

    fn drop_attribute(&mut self, table_id: TableId, position: usize) -> Result<()> {
        let schema = self.table(table_id)?.schema().with_attribute_dropped(position)?;

        let tuples = self
            .scan_table(table_id)?
            .into_iter()
            .map(|tuple| {
                let mut values = tuple.into_values();
                values.remove(position);
                Tuple::new(values)
            })
            .collect();
        self.repaginate(table_id, schema, tuples)
    }

    /// Rewrites a table under a new schema. `tuples` must already match the
    /// schema and be in key order.
    ///
    /// New pages go to disk under fresh ids, then the new meta is written.
    /// Until that write succeeds the table is untouched; afterwards the old
    /// pages are dropped from the pool and from disk.
    fn repaginate(&mut self, table_id: TableId, schema: TableSchema, tuples: Vec<Tuple>) -> Result<()> {
        let EngineState {
            tables, pool, disk, ..
        } = self;
        let meta = tables
            .get_mut(&table_id)
            .ok_or(StoreError::TableNotFound(table_id))?;

        let mut rewritten = meta.clone();
        rewritten.replace_schema(schema);
        let schema = Arc::clone(rewritten.schema());

        let written = write_pages(pool, &mut rewritten, &schema, &tuples)
            .and_then(|()| disk.write_table_meta(table_id, &rewritten.serialize()));
        if let Err(e) = written {
            warn!(%table_id, error = %e, "repagination failed, keeping old pages");
            remove_page_files(disk.as_ref(), table_id, rewritten.directory());
            return Err(e);
        }

        let old = std::mem::replace(meta, rewritten);
        pool.discard_table(table_id);
        remove_page_files(disk.as_ref(), table_id, old.directory());

        info!(
            %table_id,
            attributes = schema.attribute_count(),
            records = tuples.len(),
            pages = meta.directory().len(),
            "table repaginated"
        );
        Ok(())
    }

    fn persist_metas(&self) -> Result<()> {
        for (table_id, meta) in &self.tables {
            self.disk.write_table_meta(*table_id, &meta.serialize())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let written = self.pool.flush_dirty()?;
        self.persist_metas()?;
        debug!(written, tables = self.tables.len(), "engine flushed");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.pool.flush_all()?;
        self.persist_metas()?;
        info!(tables = self.tables.len(), "engine shut down");
        Ok(())
    }
}

/// Finds the first occupied page in `directory[from..to]` and compares `key`
/// with its first and last record.
fn first_occupied(
    pool: &mut BufferPool,
    schema: &Arc<TableSchema>,
    directory: &[PageId],
    from: usize,
    to: usize,
    key: &[Value],
) -> Result<Option<(usize, (Ordering, Ordering))>> {
    for (index, &page_id) in directory.iter().enumerate().take(to).skip(from) {
        let page = pool.fetch(schema, page_id)?.as_record()?;
        if let Some(bounds) = page.bounds(schema, key) {
            return Ok(Some((index, bounds)));
        }
    }
    Ok(None)
}

/// Picks the page an insert of `key` should go to, or None for an empty table.
///
/// The first page whose last key is not below `key` wins. A key above every
/// page lands on the last non-empty page. Empty pages are only chosen when
/// the whole table is empty. The directory is binary searched, skipping
/// empty pages.
fn route_insert(
    pool: &mut BufferPool,
    schema: &Arc<TableSchema>,
    directory: &[PageId],
    key: &[Value],
) -> Result<Option<usize>> {
    let (mut lo, mut hi) = (0, directory.len());
    let mut target = None;
    let mut last_below = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match first_occupied(pool, schema, directory, mid, hi, key)? {
            None => hi = mid,
            Some((index, (_, Ordering::Greater))) => {
                last_below = Some(index);
                lo = index + 1;
            }
            Some((index, _)) => {
                target = Some(index);
                hi = mid;
            }
        }
    }

    Ok(target
        .or(last_below)
        .or_else(|| (!directory.is_empty()).then_some(0)))
}

/// Finds the only page that can hold `key` by binary search over the
/// directory. Returns None when the key falls outside every page.
fn locate(
    pool: &mut BufferPool,
    schema: &Arc<TableSchema>,
    directory: &[PageId],
    key: &[Value],
) -> Result<Option<PageId>> {
    let (mut lo, mut hi) = (0, directory.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match first_occupied(pool, schema, directory, mid, hi, key)? {
            None | Some((_, (Ordering::Less, _))) => hi = mid,
            Some((index, (_, Ordering::Greater))) => lo = index + 1,
            Some((index, _)) => return Ok(Some(directory[index])),
        }
    }
    Ok(None)
}

/// Splits the full page at `index` and inserts `tuple` into whichever half
/// covers its key. The source page must be pinned by the caller.
fn split_and_insert(
    pool: &mut BufferPool,
    meta: &mut TableMeta,
    schema: &Arc<TableSchema>,
    index: usize,
    tuple: Tuple,
    key: &[Value],
) -> Result<()> {
    // make room for the spawned page before touching anything
    pool.reserve_frame()?;

    let page_key = PageKey::new(schema.table_id(), meta.directory()[index]);
    let new_page_id = meta.allocate_page_id();
    let kept = pool
        .get_mut(page_key)
        .ok_or(StoreError::PageNotFound(page_key))?
        .as_record_mut()?;
    let mut spawned = kept.split(new_page_id);

    let to_spawned = spawned
        .entries()
        .first()
        .map(|first| schema.compare_key(key, first) != Ordering::Less);
    let position = match to_spawned {
        Some(true) => {
            spawned.insert(schema, tuple)?;
            index + 1
        }
        Some(false) => {
            kept.insert(schema, tuple)?;
            index + 1
        }
        None => {
            // one record per page: nothing moved, the new record gets the new page
            let before = kept
                .entries()
                .first()
                .map_or(false, |first| schema.compare_key(key, first) == Ordering::Less);
            spawned.insert(schema, tuple)?;
            if before {
                index
            } else {
                index + 1
            }
        }
    };

    debug!(
        page = %page_key,
        spawned = %new_page_id,
        kept = kept.occupied_count(),
        moved = spawned.occupied_count(),
        "page split"
    );

    pool.register(schema, spawned.into())?;
    meta.insert_page(position, new_page_id);
    Ok(())
}

/// Packs `tuples` into full pages and writes each one straight to disk,
/// adding it to `meta`'s directory once its write has succeeded.
fn write_pages(
    pool: &BufferPool,
    meta: &mut TableMeta,
    schema: &Arc<TableSchema>,
    tuples: &[Tuple],
) -> Result<()> {
    for chunk in tuples.chunks(schema.max_records_per_page()) {
        let page_id = meta.allocate_page_id();
        let mut page = RecordPage::new(schema, page_id);
        for tuple in chunk {
            page.insert(schema, tuple.clone())?;
        }
        pool.scheduler()
            .write_sync(page.key(), page.encode(schema)?)?;
        meta.push_page(page_id);
    }
    Ok(())
}

/// Deletes page files that no longer belong to the table. Failures leave
/// orphan files behind and are only logged.
fn remove_page_files(disk: &dyn DiskManager, table_id: TableId, pages: &[PageId]) {
    for &page_id in pages {
        let key = PageKey::new(table_id, page_id);
        if let Err(e) = disk.delete_page(key) {
            warn!(%key, error = %e, "failed to delete page file");
        }
    }
}

/// Orders listed pages by their first key; empty pages go last.
fn rebuild_directory(
    pool: &mut BufferPool,
    schema: &Arc<TableSchema>,
    listed: &[PageId],
) -> Result<Vec<PageId>> {
    let mut ranked = Vec::with_capacity(listed.len());
    for &page_id in listed {
        let page = pool.fetch(schema, page_id)?.as_record()?;
        ranked.push((page_id, page.entries().first().cloned()));
    }

    ranked.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => schema.compare_keys(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    Ok(ranked.into_iter().map(|(page_id, _)| page_id).collect())
}
