use std::sync::Arc;

use pagestore::common::{EngineConfig, TableId};
use pagestore::engine::StorageEngine;
use pagestore::storage::disk::FileDiskManager;
use pagestore::tuple::{DataType, TupleBuilder, Value};

fn main() {
    println!("Pagestore - a paged storage engine in Rust");
    println!("==========================================\n");

    if let Err(e) = run() {
        eprintln!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> pagestore::Result<()> {
    let data_dir = std::env::temp_dir().join("pagestore-demo");
    let table = TableId::new(1);
    std::fs::remove_dir_all(&data_dir).ok();

    {
        let disk = Arc::new(FileDiskManager::new(&data_dir)?);
        println!("Created disk manager at: {}", data_dir.display());

        // 64-byte pages hold 8 records of 8 bytes, so a few inserts split pages
        let config = EngineConfig::new().page_size(64).max_pages(4);
        let engine = StorageEngine::open(disk, config)?;

        let schema = engine.create_table(
            table,
            vec![DataType::Integer, DataType::Char(4)],
            vec![0],
        )?;
        println!(
            "Created {} with {}-byte records, {} per page\n",
            table,
            schema.record_width(),
            schema.max_records_per_page()
        );

        for key in [42, 7, 19, 3, 88, 61, 25, 14, 50, 33, 9, 70] {
            let name = format!("r{}", key);
            engine.insert_record(table, TupleBuilder::new().value(key).char(name).build())?;
        }
        println!("Inserted {} records", engine.record_count(table)?);
        println!("  - Pages: {:?}", engine.page_ids(table)?);
        println!("  - Resident pages: {}", engine.resident_count());

        engine.shutdown()?;
        println!("\nFlushed everything to disk");
    }

    // Reopen and read the data back
    {
        let disk = Arc::new(FileDiskManager::new(&data_dir)?);
        let engine = StorageEngine::open(disk, EngineConfig::new().max_pages(4))?;

        let record = engine.get_record(table, &[Value::Integer(19)])?;
        println!("\nLookup of key 19 after reopen: {}", record);

        println!("Full scan in key order:");
        for tuple in engine.scan_table(table)? {
            println!("  - {}", tuple);
        }

        engine.drop_table(table)?;
    }

    // Clean up
    std::fs::remove_dir_all(&data_dir).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
