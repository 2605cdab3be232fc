use crate::common::{PageId, PageKey, TableId};

/// Placeholder for secondary-index pages.
///
/// Index pages can be created and cached, but they hold no entries and cannot
/// be searched, mutated, or persisted yet. Every such operation on [`super::Page`]
/// returns `UnsupportedPageKind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    table_id: TableId,
    page_id: PageId,
    dirty: bool,
}

impl IndexPage {
    pub fn new(table_id: TableId, page_id: PageId) -> Self {
        Self {
            table_id,
            page_id,
            dirty: false,
        }
    }

    pub fn key(&self) -> PageKey {
        PageKey::new(self.table_id, self.page_id)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}
