use thiserror::Error;

use super::types::{PageKey, TableId};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Record not found")]
    RecordNotFound,

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} already exists")]
    TableAlreadyExists(TableId),

    #[error("{0} not found")]
    PageNotFound(PageKey),

    #[error("Value of {actual} bytes exceeds declared length {max}")]
    ValueTooLong { max: usize, actual: usize },

    #[error("Malformed {data_type} literal: {literal:?}")]
    MalformedLiteral { literal: String, data_type: String },

    #[error("Record width {record_width} does not fit in a {page_size}-byte page")]
    DegenerateSchema {
        record_width: usize,
        page_size: usize,
    },

    #[error("Update would change the record key")]
    KeyChanged,

    #[error("{0} is full")]
    PageFull(PageKey),

    #[error("Buffer pool is full, no evictable pages available")]
    BufferPoolFull,

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Unsupported page kind: {0}")]
    UnsupportedPageKind(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
