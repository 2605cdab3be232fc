//! Pagestore - a paged storage engine for fixed-schema tuples
//!
//! Records are typed tuples stored in fixed-width encoding inside key-sorted
//! pages. A bounded buffer pool keeps the working set in memory and writes
//! dirty pages back on eviction or shutdown.
//!
//! # Architecture
//!
//! - **Tuple Layer** (`tuple`): typed values, tuples and table schemas
//!   - `Value`/`DataType`: fixed-width big-endian codec and literal parsing
//!   - `TableSchema`: record width, page capacity and the key comparator
//!
//! - **Storage Layer** (`storage`): page layout and persistence
//!   - `RecordPage`: sorted slot array with binary search and split
//!   - `DiskManager`: page and table meta persistence (file or memory backed)
//!   - `DiskScheduler`: background worker for page I/O
//!
//! - **Buffer Pool** (`buffer`): bounded page cache
//!   - `BufferPool`: fetch, register, pin and flush resident pages
//!   - `LruReplacer`: least-recently-used eviction
//!
//! - **Engine** (`engine`): record-level API
//!   - `StorageEngine`: create/drop tables, insert/get/update/remove records
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagestore::common::{EngineConfig, TableId};
//! use pagestore::engine::StorageEngine;
//! use pagestore::storage::disk::FileDiskManager;
//! use pagestore::tuple::{DataType, TupleBuilder, Value};
//!
//! let disk = Arc::new(FileDiskManager::new("data").unwrap());
//! let engine = StorageEngine::open(disk, EngineConfig::new()).unwrap();
//!
//! let table = TableId::new(1);
//! engine
//!     .create_table(table, vec![DataType::Integer, DataType::Char(8)], vec![0])
//!     .unwrap();
//! engine
//!     .insert_record(table, TupleBuilder::new().value(1).char("alice").build())
//!     .unwrap();
//!
//! let record = engine.get_record(table, &[Value::Integer(1)]).unwrap();
//! println!("{}", record);
//!
//! engine.shutdown().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod engine;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{EngineConfig, PageId, PageKey, Result, StoreError, TableId};
pub use engine::StorageEngine;
