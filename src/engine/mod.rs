mod storage_engine;
mod table_meta;

pub use storage_engine::StorageEngine;
pub use table_meta::TableMeta;
