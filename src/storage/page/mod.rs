mod index_page;
mod record_page;

pub use index_page::IndexPage;
pub use record_page::RecordPage;
pub(crate) use record_page::format_key;

use bytes::Bytes;

use crate::common::{PageKey, Result, StoreError};
use crate::tuple::TableSchema;

/// The kinds of page the buffer pool can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Record,
    Index,
}

/// A resident page. The buffer pool only needs identity, dirtiness and
/// encoding, so it stays agnostic of the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    Record(RecordPage),
    Index(IndexPage),
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Record(_) => PageKind::Record,
            Page::Index(_) => PageKind::Index,
        }
    }

    pub fn key(&self) -> PageKey {
        match self {
            Page::Record(page) => page.key(),
            Page::Index(page) => page.key(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Page::Record(page) => page.is_dirty(),
            Page::Index(page) => page.is_dirty(),
        }
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        match self {
            Page::Record(page) => page.set_dirty(dirty),
            Page::Index(page) => page.set_dirty(dirty),
        }
    }

    /// Returns true if another entry fits without splitting.
    pub fn has_space(&self) -> bool {
        match self {
            Page::Record(page) => page.has_space(),
            Page::Index(_) => false,
        }
    }

    pub fn as_record(&self) -> Result<&RecordPage> {
        match self {
            Page::Record(page) => Ok(page),
            Page::Index(_) => Err(StoreError::UnsupportedPageKind("index")),
        }
    }

    pub fn as_record_mut(&mut self) -> Result<&mut RecordPage> {
        match self {
            Page::Record(page) => Ok(page),
            Page::Index(_) => Err(StoreError::UnsupportedPageKind("index")),
        }
    }

    /// Encodes the page for the disk manager.
    pub fn encode(&self, schema: &TableSchema) -> Result<Bytes> {
        match self {
            Page::Record(page) => page.encode(schema),
            Page::Index(_) => Err(StoreError::UnsupportedPageKind("index")),
        }
    }
}

impl From<RecordPage> for Page {
    fn from(page: RecordPage) -> Self {
        Page::Record(page)
    }
}
