//! Integration tests for MemoryDatabase
//!
//! These tests drive the backend only through the `Database` boundary:
//! - Concurrent read-modify-write under optimistic validation
//! - LIMIT/OFFSET paging over an ordered SELECT
//! - Read-only transactions and parameter binding

use std::sync::{Arc, Barrier};
use std::thread;

use keystone_core::{Context, Database, Mutation, Row, Statement, Value};
use keystone_storage::{MemoryDatabase, RetryConfig, TableSchema};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn counters_db() -> MemoryDatabase {
    MemoryDatabase::new()
        .with_retry(RetryConfig::immediate(200))
        .with_table(TableSchema::new("Counters", &["Name"]))
}

fn read_counter(db: &MemoryDatabase, name: &str) -> i64 {
    let mut txn = db.single(&Context::background()).unwrap();
    let stmt = Statement::new("SELECT Value FROM Counters WHERE Name = @name").bind("name", name);
    let row = txn.query(&stmt).unwrap().next_row().unwrap().unwrap();
    row.get("Value").and_then(Value::as_int).unwrap()
}

fn numbers_db(n: i64) -> MemoryDatabase {
    let db = MemoryDatabase::new().with_table(TableSchema::new("Numbers", &["N"]));
    let rows = (0..n)
        .map(|i| Mutation::InsertOrUpdate {
            table: "Numbers".into(),
            row: Row::new().with("N", i).with("Parity", i % 2),
        })
        .collect();
    db.apply(&Context::background(), rows).unwrap();
    db
}

// ============================================================================
// Concurrency
// ============================================================================

/// Increments from many threads are never lost
#[test]
fn test_concurrent_increments_are_serialized() {
    let db = Arc::new(counters_db());
    db.apply(
        &Context::background(),
        vec![Mutation::InsertOrUpdate {
            table: "Counters".into(),
            row: Row::new().with("Name", "hits").with("Value", 0i64),
        }],
    )
    .unwrap();

    let threads = 4;
    let per_thread = 10;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..per_thread {
                    db.read_write_transaction(&Context::background(), &mut |txn| {
                        let stmt = Statement::new("SELECT * FROM Counters WHERE Name = @name")
                            .bind("name", "hits");
                        let current = txn
                            .query(&stmt)?
                            .next_row()?
                            .and_then(|r| r.get("Value").and_then(Value::as_int))
                            .unwrap_or(0);
                        txn.buffer(vec![Mutation::InsertOrUpdate {
                            table: "Counters".into(),
                            row: Row::new().with("Name", "hits").with("Value", current + 1),
                        }])
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(read_counter(&db, "hits"), (threads * per_thread) as i64);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_filtered_ordered_query() {
    let db = numbers_db(10);
    let mut txn = db.single(&Context::background()).unwrap();
    let stmt = Statement::new(
        "SELECT N FROM Numbers WHERE Parity = @parity AND N >= 3 ORDER BY N DESC LIMIT @limit",
    )
    .bind("parity", 1i64)
    .bind("limit", 2i64);
    let got: Vec<i64> = txn
        .query(&stmt)
        .unwrap()
        .map(|r| r.unwrap().get("N").and_then(Value::as_int).unwrap())
        .collect();
    assert_eq!(got, vec![9, 7]);
}

#[test]
fn test_cancelled_context_rejects_reads() {
    let db = numbers_db(1);
    let ctx = Context::background();
    ctx.cancel();
    assert!(db.single(&ctx).is_err());
}

proptest! {
    /// Walking LIMIT/OFFSET pages returns every row exactly once
    #[test]
    fn prop_offset_paging_covers_all_rows(total in 0i64..40, page in 1i64..7) {
        let db = numbers_db(total);
        let mut seen = Vec::new();
        let mut offset = 0i64;
        loop {
            let mut txn = db.single(&Context::background()).unwrap();
            let stmt = Statement::new("SELECT N FROM Numbers ORDER BY N LIMIT @size OFFSET @offset")
                .bind("size", page)
                .bind("offset", offset);
            let rows: Vec<i64> = txn
                .query(&stmt)
                .unwrap()
                .map(|r| r.unwrap().get("N").and_then(Value::as_int).unwrap())
                .collect();
            let full = rows.len() as i64 == page;
            seen.extend(rows);
            if !full {
                break;
            }
            offset += page;
        }
        prop_assert_eq!(seen, (0..total).collect::<Vec<_>>());
    }
}
