use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::{PageId, PageKey, Result, StoreError, TableId};
use crate::tuple::{TableSchema, Tuple, Value};

/// Record page on-disk layout:
///
/// | Field          | Offset | Size                    |
/// |----------------|--------|-------------------------|
/// | occupied_count | 0      | 4                       |
/// | records        | 4      | count * record_width    |
///
/// All integers are big-endian.
const COUNT_SIZE: usize = 4;

/// A page of records for one table, kept sorted by the schema's key.
///
/// `entries[0..occupied_count)` is always strictly ascending under
/// [`TableSchema::compare_keys`]. Mutations either complete or leave the page
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    table_id: TableId,
    page_id: PageId,
    capacity: usize,
    entries: Vec<Tuple>,
    dirty: bool,
}

impl RecordPage {
    /// Creates an empty page. A new page has never been written, so it starts dirty.
    pub fn new(schema: &TableSchema, page_id: PageId) -> Self {
        let capacity = schema.max_records_per_page();
        Self {
            table_id: schema.table_id(),
            page_id,
            capacity,
            entries: Vec::with_capacity(capacity),
            dirty: true,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn key(&self) -> PageKey {
        PageKey::new(self.table_id, self.page_id)
    }

    pub fn occupied_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_space(&self) -> bool {
        self.entries.len() < self.capacity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Returns the occupied slots in key order.
    pub fn entries(&self) -> &[Tuple] {
        &self.entries
    }

    /// Returns the tuple in the given slot.
    pub fn get(&self, slot: usize) -> Option<&Tuple> {
        self.entries.get(slot)
    }

    /// Binary search for `key`: `Ok(slot)` if present, `Err(slot)` with the
    /// insertion point otherwise.
    fn search(&self, schema: &TableSchema, key: &[Value]) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| schema.compare_key(key, entry).reverse())
    }

    /// Returns the slot holding `key`, if any.
    pub fn find(&self, schema: &TableSchema, key: &[Value]) -> Option<usize> {
        self.search(schema, key).ok()
    }

    /// Returns the tuple stored under `key`, if any.
    pub fn get_record(&self, schema: &TableSchema, key: &[Value]) -> Option<&Tuple> {
        self.find(schema, key).map(|slot| &self.entries[slot])
    }

    /// Compares `key` against the first and last occupied slots.
    /// Returns None for an empty page.
    pub fn bounds(&self, schema: &TableSchema, key: &[Value]) -> Option<(Ordering, Ordering)> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        Some((schema.compare_key(key, first), schema.compare_key(key, last)))
    }

    /// Inserts a tuple at its sorted position and returns the slot used.
    ///
    /// Returns `PageFull` when no slot is free; the caller splits and retries.
    pub fn insert(&mut self, schema: &TableSchema, tuple: Tuple) -> Result<usize> {
        if !self.has_space() {
            return Err(StoreError::PageFull(self.key()));
        }
        let key = schema.key_of(&tuple);
        match self.search(schema, &key) {
            Ok(_) => Err(StoreError::DuplicateKey(format_key(&key))),
            Err(slot) => {
                self.entries.insert(slot, tuple);
                self.dirty = true;
                Ok(slot)
            }
        }
    }

    /// Removes the tuple stored under `key` and returns it.
    pub fn delete(&mut self, schema: &TableSchema, key: &[Value]) -> Result<Tuple> {
        let slot = self.find(schema, key).ok_or(StoreError::RecordNotFound)?;
        self.dirty = true;
        Ok(self.entries.remove(slot))
    }

    /// Overwrites the tuple stored under `key` in place and returns the old one.
    /// The replacement must carry the same key.
    pub fn update(&mut self, schema: &TableSchema, key: &[Value], tuple: Tuple) -> Result<Tuple> {
        if schema.compare_key(key, &tuple) != Ordering::Equal {
            return Err(StoreError::KeyChanged);
        }
        let slot = self.find(schema, key).ok_or(StoreError::RecordNotFound)?;
        self.dirty = true;
        Ok(std::mem::replace(&mut self.entries[slot], tuple))
    }

    /// Moves the upper half of the entries into a new page with `new_page_id`.
    ///
    /// With an odd count the extra entry stays in this page. Both pages are
    /// left dirty and each keeps a contiguous sorted run starting at slot 0.
    pub fn split(&mut self, new_page_id: PageId) -> RecordPage {
        let count = self.entries.len();
        let split_point = count / 2;
        let start = if count - split_point != split_point {
            split_point + 1
        } else {
            split_point
        };

        let mut moved = Vec::with_capacity(self.capacity);
        moved.extend(self.entries.drain(start..));
        self.dirty = true;

        RecordPage {
            table_id: self.table_id,
            page_id: new_page_id,
            capacity: self.capacity,
            entries: moved,
            dirty: true,
        }
    }

    /// Encodes the page: occupied count followed by the fixed-width records.
    pub fn encode(&self, schema: &TableSchema) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(COUNT_SIZE + self.entries.len() * schema.record_width());
        buf.put_u32(self.entries.len() as u32);
        for tuple in &self.entries {
            schema.encode_tuple(tuple, &mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decodes a page written by [`RecordPage::encode`], checking its size
    /// and ordering.
    pub fn decode(schema: &TableSchema, page_id: PageId, data: &[u8]) -> Result<Self> {
        let key = PageKey::new(schema.table_id(), page_id);
        if data.len() < COUNT_SIZE {
            return Err(StoreError::Corrupted(format!("{} has no record count", key)));
        }
        let count = (&data[..COUNT_SIZE]).get_u32() as usize;
        let width = schema.record_width();
        if count > schema.max_records_per_page() || data.len() != COUNT_SIZE + count * width {
            return Err(StoreError::Corrupted(format!(
                "{} holds {} bytes for {} records of width {}",
                key,
                data.len(),
                count,
                width
            )));
        }

        let mut page = RecordPage::new(schema, page_id);
        for i in 0..count {
            let tuple = schema.decode_tuple(data, COUNT_SIZE + i * width)?;
            if let Some(prev) = page.entries.last() {
                if schema.compare_keys(prev, &tuple) != Ordering::Less {
                    return Err(StoreError::Corrupted(format!(
                        "{} is not sorted at slot {}",
                        key, i
                    )));
                }
            }
            page.entries.push(tuple);
        }
        page.dirty = false;
        Ok(page)
    }
}

/// Renders key values for error messages.
pub(crate) fn format_key(key: &[Value]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
