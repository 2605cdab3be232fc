//! Integration tests for the record-level storage engine

use std::sync::Arc;

use pagestore::common::{EngineConfig, PageId, PageKey, StoreError, TableId};
use pagestore::engine::StorageEngine;
use pagestore::storage::disk::{DiskManager, FileDiskManager, MemoryDiskManager};
use pagestore::tuple::{DataType, Tuple, TupleBuilder, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

const TABLE: TableId = TableId(1);

/// Integer key + CHAR(4): 8-byte records, 4 per 32-byte page
fn small_pages(max_pages: usize) -> EngineConfig {
    EngineConfig::new().page_size(32).max_pages(max_pages)
}

fn create_table(engine: &StorageEngine) {
    engine
        .create_table(TABLE, vec![DataType::Integer, DataType::Char(4)], vec![0])
        .unwrap();
}

fn row(key: i32) -> Tuple {
    TupleBuilder::new()
        .value(key)
        .char(format!("r{}", key % 1000))
        .build()
}

fn scanned_keys(engine: &StorageEngine) -> Vec<i32> {
    engine
        .scan_table(TABLE)
        .unwrap()
        .iter()
        .map(|tuple| match tuple.value(0) {
            Some(Value::Integer(key)) => *key,
            other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[test]
fn test_engine_insert_scenario() {
    let engine = StorageEngine::in_memory(small_pages(8)).unwrap();
    create_table(&engine);

    for key in [3, 1, 4] {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    assert!(matches!(
        engine.insert_record(TABLE, row(1)),
        Err(StoreError::DuplicateKey(_))
    ));
    for key in [5, 9, 2, 6] {
        engine.insert_record(TABLE, row(key)).unwrap();
    }

    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(4)]).unwrap(),
        row(4)
    );
    assert!(engine.page_count(TABLE).unwrap() >= 2);
    assert_eq!(scanned_keys(&engine), vec![1, 2, 3, 4, 5, 6, 9]);
    assert_eq!(engine.record_count(TABLE).unwrap(), 7);

    // one more record splits the upper page again
    engine.insert_record(TABLE, row(7)).unwrap();
    assert!(engine.page_count(TABLE).unwrap() >= 3);
    assert_eq!(scanned_keys(&engine), vec![1, 2, 3, 4, 5, 6, 7, 9]);
}

#[test]
fn test_engine_no_loss_under_eviction() {
    let engine = StorageEngine::in_memory(small_pages(3)).unwrap();
    create_table(&engine);

    let mut keys: Vec<i32> = (0..400).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));
    for &key in &keys {
        engine.insert_record(TABLE, row(key)).unwrap();
        assert!(engine.resident_count() <= 3);
    }

    assert!(engine.page_count(TABLE).unwrap() >= 100);
    for &key in &keys {
        assert_eq!(
            engine.get_record(TABLE, &[Value::Integer(key)]).unwrap(),
            row(key)
        );
    }
    assert_eq!(scanned_keys(&engine), (0..400).collect::<Vec<_>>());
}

#[test]
fn test_engine_duplicate_leaves_occupancy() {
    let engine = StorageEngine::in_memory(small_pages(4)).unwrap();
    create_table(&engine);
    for key in [10, 20, 30, 40] {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    let pages = engine.page_count(TABLE).unwrap();

    // the page is full, so a duplicate must not trigger a split
    assert!(matches!(
        engine.insert_record(TABLE, row(20)),
        Err(StoreError::DuplicateKey(_))
    ));
    assert_eq!(engine.page_count(TABLE).unwrap(), pages);
    assert_eq!(engine.record_count(TABLE).unwrap(), 4);
}

#[test]
fn test_engine_remove_missing_is_byte_identical() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = StorageEngine::open(dm.clone(), small_pages(4)).unwrap();
    create_table(&engine);
    for key in [1, 2, 3] {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    engine.flush().unwrap();

    let page_key = PageKey::new(TABLE, engine.page_ids(TABLE).unwrap()[0]);
    let before = dm.read_page(page_key).unwrap();

    assert!(matches!(
        engine.remove_record(TABLE, &[Value::Integer(5)]),
        Err(StoreError::RecordNotFound)
    ));
    assert_eq!(engine.is_dirty(page_key), Some(false));

    engine.flush().unwrap();
    assert_eq!(dm.read_page(page_key).unwrap(), before);
}

#[test]
fn test_engine_update_and_remove() {
    let engine = StorageEngine::in_memory(small_pages(4)).unwrap();
    create_table(&engine);
    for key in 0..10 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }

    let updated = TupleBuilder::new().value(7).char("new").build();
    assert_eq!(engine.update_record(TABLE, updated.clone()).unwrap(), row(7));
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(7)]).unwrap(),
        updated
    );
    assert!(matches!(
        engine.update_record(TABLE, row(70)),
        Err(StoreError::RecordNotFound)
    ));

    assert_eq!(
        engine.remove_record(TABLE, &[Value::Integer(3)]).unwrap(),
        row(3)
    );
    assert!(matches!(
        engine.get_record(TABLE, &[Value::Integer(3)]),
        Err(StoreError::RecordNotFound)
    ));
    assert_eq!(scanned_keys(&engine), vec![0, 1, 2, 4, 5, 6, 7, 8, 9]);

    // emptied pages stay in the directory until the table is cleared
    let pages = engine.page_count(TABLE).unwrap();
    for key in 0..3 {
        engine.remove_record(TABLE, &[Value::Integer(key)]).unwrap();
    }
    assert_eq!(engine.page_count(TABLE).unwrap(), pages);
    engine.insert_record(TABLE, row(1)).unwrap();
    assert_eq!(scanned_keys(&engine), vec![1, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_engine_rejects_bad_tuples() {
    let engine = StorageEngine::in_memory(small_pages(4)).unwrap();
    create_table(&engine);

    assert!(matches!(
        engine.insert_record(TABLE, TupleBuilder::new().value(1).build()),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.insert_record(TABLE, TupleBuilder::new().value(1.5).char("x").build()),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.insert_record(TABLE, TupleBuilder::new().value(1).char("toolong").build()),
        Err(StoreError::ValueTooLong { max: 4, .. })
    ));
    assert!(matches!(
        engine.get_record(TABLE, &[Value::Boolean(true)]),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.create_table(TableId::new(2), vec![DataType::Char(64)], vec![0]),
        Err(StoreError::DegenerateSchema { .. })
    ));
}

#[test]
fn test_engine_persistence_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let dm = Arc::new(FileDiskManager::new(temp_dir.path()).unwrap());
        let engine = StorageEngine::open(dm, small_pages(3)).unwrap();
        create_table(&engine);
        for key in (0..60).rev() {
            engine.insert_record(TABLE, row(key)).unwrap();
        }
        engine.shutdown().unwrap();
        assert_eq!(engine.resident_count(), 0);
    }

    let dm = Arc::new(FileDiskManager::new(temp_dir.path()).unwrap());
    let engine = StorageEngine::open(dm, small_pages(3)).unwrap();
    assert_eq!(engine.table_ids(), vec![TABLE]);
    assert_eq!(engine.schema(TABLE).unwrap().max_records_per_page(), 4);
    assert_eq!(scanned_keys(&engine), (0..60).collect::<Vec<_>>());
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(33)]).unwrap(),
        row(33)
    );
}

#[test]
fn test_engine_rebuilds_stale_directory() {
    let dm = Arc::new(MemoryDiskManager::new());

    let stale_meta = {
        let engine = StorageEngine::open(dm.clone(), small_pages(4)).unwrap();
        create_table(&engine);
        for key in [50, 10, 40, 20] {
            engine.insert_record(TABLE, row(key)).unwrap();
        }
        engine.flush().unwrap();
        let stale = dm.read_table_meta(TABLE).unwrap().unwrap();

        for key in [30, 5, 45, 15, 25, 35] {
            engine.insert_record(TABLE, row(key)).unwrap();
        }
        stale
    };

    // simulate a crash that lost the latest directory
    dm.write_table_meta(TABLE, &stale_meta).unwrap();

    let engine = StorageEngine::open(dm.clone(), small_pages(4)).unwrap();
    assert!(engine.page_count(TABLE).unwrap() > 1);
    assert_eq!(
        scanned_keys(&engine),
        vec![5, 10, 15, 20, 25, 30, 35, 40, 45, 50]
    );

    // new pages do not collide with the recovered ones
    for key in 51..60 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    assert_eq!(engine.record_count(TABLE).unwrap(), 19);
}

#[test]
fn test_engine_clear_and_drop_table() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = StorageEngine::open(dm.clone(), small_pages(4)).unwrap();
    create_table(&engine);
    for key in 0..20 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    engine.flush().unwrap();
    assert!(!dm.list_page_ids(TABLE).unwrap().is_empty());

    engine.clear_table(TABLE).unwrap();
    assert_eq!(engine.page_count(TABLE).unwrap(), 0);
    assert!(engine.scan_table(TABLE).unwrap().is_empty());
    assert!(dm.list_page_ids(TABLE).unwrap().is_empty());

    engine.insert_record(TABLE, row(1)).unwrap();
    assert_eq!(engine.record_count(TABLE).unwrap(), 1);

    engine.drop_table(TABLE).unwrap();
    assert!(engine.table_ids().is_empty());
    assert!(dm.list_table_ids().unwrap().is_empty());
    assert!(matches!(
        engine.drop_table(TABLE),
        Err(StoreError::TableNotFound(_))
    ));
    assert!(matches!(
        engine.clear_table(TABLE),
        Err(StoreError::TableNotFound(_))
    ));
}

#[test]
fn test_engine_add_and_drop_attribute() {
    let engine = StorageEngine::in_memory(small_pages(4)).unwrap();
    create_table(&engine);
    for key in 0..8 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }

    // 8-byte records become 16 bytes: two per page
    engine
        .add_attribute(TABLE, DataType::Double, Value::Double(0.5))
        .unwrap();
    let schema = engine.schema(TABLE).unwrap();
    assert_eq!(schema.record_width(), 16);
    assert_eq!(schema.max_records_per_page(), 2);
    assert_eq!(engine.page_count(TABLE).unwrap(), 4);
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(5)]).unwrap(),
        TupleBuilder::new().value(5).char("r5").value(0.5).build()
    );

    assert!(matches!(
        engine.add_attribute(TABLE, DataType::Integer, Value::Boolean(true)),
        Err(StoreError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.add_attribute(TABLE, DataType::Char(40), Value::Char(String::new())),
        Err(StoreError::DegenerateSchema { .. })
    ));
    assert!(matches!(
        engine.drop_attribute(TABLE, 0),
        Err(StoreError::SchemaMismatch(_))
    ));

    engine.drop_attribute(TABLE, 1).unwrap();
    let schema = engine.schema(TABLE).unwrap();
    assert_eq!(schema.attributes(), &[DataType::Integer, DataType::Double]);
    assert_eq!(schema.max_records_per_page(), 2);
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(7)]).unwrap(),
        TupleBuilder::new().value(7).value(0.5).build()
    );
    assert_eq!(scanned_keys(&engine), (0..8).collect::<Vec<_>>());

    engine
        .insert_record(TABLE, TupleBuilder::new().value(8).value(1.0).build())
        .unwrap();
    assert_eq!(engine.record_count(TABLE).unwrap(), 9);
}

#[test]
fn test_engine_io_failure_on_eviction() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = StorageEngine::open(dm.clone(), small_pages(2)).unwrap();
    create_table(&engine);
    for key in 0..20 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    engine.flush().unwrap();

    // dirty the first page, then make its write-back fail
    let updated = TupleBuilder::new().value(0).char("upd").build();
    engine.update_record(TABLE, updated.clone()).unwrap();
    dm.set_fail_writes(true);

    assert!(matches!(
        engine.get_record(TABLE, &[Value::Integer(19)]),
        Err(StoreError::Io(_))
    ));

    dm.set_fail_writes(false);
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(19)]).unwrap(),
        row(19)
    );
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(0)]).unwrap(),
        updated
    );
    assert_eq!(engine.record_count(TABLE).unwrap(), 20);
}

/// Disk page ids of the table, in id order
fn pages_on_disk(dm: &MemoryDiskManager) -> Vec<PageId> {
    dm.list_page_ids(TABLE).unwrap()
}

/// Two tables sharing a two-page pool, everything flushed
fn loaded_engine(dm: &Arc<MemoryDiskManager>) -> StorageEngine {
    let engine = StorageEngine::open(dm.clone(), small_pages(2)).unwrap();
    create_table(&engine);
    engine
        .create_table(TableId::new(2), vec![DataType::Integer], vec![0])
        .unwrap();
    for key in 0..12 {
        engine.insert_record(TABLE, row(key)).unwrap();
        engine
            .insert_record(TableId::new(2), TupleBuilder::new().value(key).build())
            .unwrap();
    }
    engine.flush().unwrap();
    engine
}

#[test]
fn test_engine_failed_add_attribute_keeps_table() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = loaded_engine(&dm);
    let before = engine.scan_table(TABLE).unwrap();
    let pages = engine.page_ids(TABLE).unwrap();
    let files = pages_on_disk(&dm);

    // 16-byte records need six new pages; fail before, during and after them
    for budget in [0, 1, 3, 6] {
        dm.fail_writes_after(budget);
        assert!(matches!(
            engine.add_attribute(TABLE, DataType::Double, Value::Double(1.0)),
            Err(StoreError::Io(_))
        ));
        dm.set_fail_writes(false);

        assert_eq!(engine.schema(TABLE).unwrap().attribute_count(), 2);
        assert_eq!(engine.page_ids(TABLE).unwrap(), pages);
        assert_eq!(engine.record_count(TABLE).unwrap(), 12);
        assert_eq!(engine.scan_table(TABLE).unwrap(), before);
        assert_eq!(pages_on_disk(&dm), files);
    }

    engine
        .add_attribute(TABLE, DataType::Boolean, Value::Boolean(false))
        .unwrap();
    drop(engine);

    let engine = StorageEngine::open(dm.clone(), small_pages(2)).unwrap();
    assert_eq!(engine.record_count(TABLE).unwrap(), 12);
    assert_eq!(
        engine.get_record(TABLE, &[Value::Integer(11)]).unwrap(),
        TupleBuilder::new().value(11).char("r11").value(false).build()
    );
    assert_eq!(engine.record_count(TableId::new(2)).unwrap(), 12);
}

#[test]
fn test_engine_failed_drop_attribute_keeps_table() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = loaded_engine(&dm);
    let before = engine.scan_table(TABLE).unwrap();
    let files = pages_on_disk(&dm);

    // 4-byte records fill two new pages; the third write is the meta
    for budget in [0, 1, 2] {
        dm.fail_writes_after(budget);
        assert!(matches!(
            engine.drop_attribute(TABLE, 1),
            Err(StoreError::Io(_))
        ));
        dm.set_fail_writes(false);

        assert_eq!(engine.schema(TABLE).unwrap().attribute_count(), 2);
        assert_eq!(engine.scan_table(TABLE).unwrap(), before);
        assert_eq!(pages_on_disk(&dm), files);
    }

    engine.drop_attribute(TABLE, 1).unwrap();
    assert_eq!(engine.page_count(TABLE).unwrap(), 2);
    assert_eq!(scanned_keys(&engine), (0..12).collect::<Vec<_>>());
}

#[test]
fn test_engine_failed_clear_keeps_records() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = loaded_engine(&dm);
    let files = pages_on_disk(&dm);

    dm.set_fail_writes(true);
    assert!(matches!(engine.clear_table(TABLE), Err(StoreError::Io(_))));
    dm.set_fail_writes(false);

    assert_eq!(engine.record_count(TABLE).unwrap(), 12);
    assert_eq!(scanned_keys(&engine), (0..12).collect::<Vec<_>>());
    assert_eq!(pages_on_disk(&dm), files);

    engine.clear_table(TABLE).unwrap();
    assert!(pages_on_disk(&dm).is_empty());
    assert_eq!(engine.record_count(TableId::new(2)).unwrap(), 12);
}

#[test]
fn test_engine_lookup_reads_few_pages() {
    let dm = Arc::new(MemoryDiskManager::new());
    let engine = StorageEngine::open(dm.clone(), small_pages(4)).unwrap();
    create_table(&engine);
    for key in 0..2000 {
        engine.insert_record(TABLE, row(key)).unwrap();
    }
    engine.flush().unwrap();
    let pages = engine.page_count(TABLE).unwrap();
    assert!(pages >= 500);

    // a binary search over ~1000 pages touches about ten of them
    for key in [1999, 0, 1234, 5000] {
        let reads = dm.get_num_reads();
        let found = engine.get_record(TABLE, &[Value::Integer(key)]);
        assert_eq!(found.is_ok(), key < 2000);
        assert!(dm.get_num_reads() - reads <= 16);
    }
}

#[test]
fn test_engine_signed_zero_is_one_key() {
    let engine = StorageEngine::in_memory(small_pages(4)).unwrap();
    let table = TableId::new(3);
    engine
        .create_table(table, vec![DataType::Double], vec![0])
        .unwrap();

    engine
        .insert_record(table, TupleBuilder::new().value(0.0).build())
        .unwrap();
    assert!(matches!(
        engine.insert_record(table, TupleBuilder::new().value(-0.0).build()),
        Err(StoreError::DuplicateKey(_))
    ));
    assert!(engine.get_record(table, &[Value::Double(-0.0)]).is_ok());
    assert_eq!(engine.record_count(table).unwrap(), 1);
}

#[test]
fn test_engine_rejects_bad_config() {
    assert!(matches!(
        StorageEngine::in_memory(EngineConfig::new().max_pages(1)),
        Err(StoreError::InvalidConfig(_))
    ));
    assert!(matches!(
        StorageEngine::in_memory(EngineConfig::new().page_size(0)),
        Err(StoreError::InvalidConfig(_))
    ));
}
