use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::{PageId, Result, StoreError};
use crate::tuple::TableSchema;

/// Magic bytes at the start of every table meta blob
const META_MAGIC: &[u8; 4] = b"PSTM";

/// Per-table bookkeeping owned by the engine: the schema, the page id
/// counter and the page directory.
///
/// The directory lists the table's pages in ascending key order. Page ids
/// say nothing about key ranges; a page spawned by a split sits right after
/// the page it came from even though its id is the newest.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    schema: Arc<TableSchema>,
    next_page_id: PageId,
    directory: Vec<PageId>,
}

impl TableMeta {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            next_page_id: PageId::new(0),
            directory: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    /// Page ids in ascending key order
    pub fn directory(&self) -> &[PageId] {
        &self.directory
    }

    /// Hands out the next page id. Ids are never reused until the table is cleared.
    pub fn allocate_page_id(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id = PageId::new(page_id.as_u32() + 1);
        page_id
    }

    pub fn insert_page(&mut self, index: usize, page_id: PageId) {
        self.directory.insert(index, page_id);
    }

    pub fn push_page(&mut self, page_id: PageId) {
        self.directory.push(page_id);
    }

    /// Replaces the directory after a rebuild, moving the id counter past
    /// every listed page.
    pub fn set_directory(&mut self, directory: Vec<PageId>) {
        if let Some(max) = directory.iter().max() {
            if max.as_u32() >= self.next_page_id.as_u32() {
                self.next_page_id = PageId::new(max.as_u32() + 1);
            }
        }
        self.directory = directory;
    }

    /// Forgets every page and restarts the id counter.
    pub fn reset(&mut self) {
        self.directory.clear();
        self.next_page_id = PageId::new(0);
    }

    /// Swaps in a new schema with an empty directory. The id counter keeps
    /// running, so pages written under the new schema never reuse the id of
    /// a page written under the old one.
    pub fn replace_schema(&mut self, schema: TableSchema) {
        self.schema = Arc::new(schema);
        self.directory.clear();
    }

    /// Serializes the meta blob.
    ///
    /// Format: magic (4) + schema descriptor + next_page_id (4) +
    /// directory_len (4) + [page_id (4)...]
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.directory.len() * 4);
        buf.put_slice(META_MAGIC);
        self.schema.serialize(&mut buf);
        buf.put_u32(self.next_page_id.as_u32());
        buf.put_u32(self.directory.len() as u32);
        for page_id in &self.directory {
            buf.put_u32(page_id.as_u32());
        }
        buf.freeze()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut src = data;
        if src.remaining() < META_MAGIC.len() || &src[..META_MAGIC.len()] != META_MAGIC {
            return Err(StoreError::Corrupted("bad table meta magic".into()));
        }
        src.advance(META_MAGIC.len());

        let schema = TableSchema::deserialize(&mut src)?;

        if src.remaining() < 8 {
            return Err(StoreError::Corrupted("truncated table meta".into()));
        }
        let next_page_id = PageId::new(src.get_u32());
        let len = src.get_u32() as usize;
        if src.remaining() != len * 4 {
            return Err(StoreError::Corrupted(format!(
                "table meta directory expects {} pages, found {} bytes",
                len,
                src.remaining()
            )));
        }
        let directory = (0..len).map(|_| PageId::new(src.get_u32())).collect();

        Ok(Self {
            schema: Arc::new(schema),
            next_page_id,
            directory,
        })
    }
}
