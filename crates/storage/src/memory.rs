//! MemoryDatabase: in-memory transactional backend
//!
//! Implements the `Database` boundary over ordered in-memory tables.
//!
//! # Concurrency
//!
//! Optimistic, first-committer-wins:
//! - Every query inside a read-write transaction records the version of each
//!   table it scanned, `EXISTS` subqueries included
//! - Commit takes the write lock, validates that every table in the read set
//!   is still at the recorded version, then applies all buffered mutations
//! - Validation failure is a `Conflict`; the closure is re-run per
//!   [`RetryConfig`] with exponential backoff that the caller's context can
//!   cut short
//! - Blind batches (`apply`) carry no read set and never conflict
//!
//! Versions are tracked per table, so two transactions that read the same
//! table conflict even when they touch different keys. That is stricter than
//! key-level validation, never weaker.
//!
//! # Atomicity
//!
//! Mutations are staged against copies of the touched tables and swapped in
//! only when every mutation succeeded, so a failing batch leaves no trace.

use crate::retry::RetryConfig;
use crate::schema::TableSchema;
use crate::sql;
use keystone_core::{
    Context, Database, Error, KeyTuple, Mutation, ReadTransaction, ReadWriteTransaction, Result,
    Row, RowIterator, Statement, Value,
};
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<KeyTuple, Row>,
    version: u64,
}

type Tables = BTreeMap<String, Table>;

fn unknown_table(name: &str) -> Error {
    Error::internal(format!("table '{}' does not exist", name))
}

/// Fill an empty generated key column so the key can be computed
fn prepare_key(schema: &TableSchema, row: &mut Row) -> Result<KeyTuple> {
    if let Some(column) = &schema.generated_id {
        let empty = row.get(column).map_or(true, Value::is_null);
        if empty && schema.primary_key.contains(column) {
            row.set(column.clone(), Uuid::new_v4().to_string());
        }
    }
    schema.key_of(row)
}

fn fill_generated(schema: &TableSchema, row: &mut Row, existing: Option<&Row>) {
    if let Some(column) = &schema.generated_id {
        if row.get(column).map_or(true, Value::is_null) {
            let id = existing
                .and_then(|r| r.get(column))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(Uuid::new_v4().to_string()));
            row.set(column.clone(), id);
        }
    }
}

fn merge_columns(schema: &TableSchema, existing: &mut Row, incoming: &Row) {
    for (column, value) in incoming.iter() {
        if schema.is_generated(column) && value.is_null() {
            continue;
        }
        existing.set(column, value.clone());
    }
}

fn apply_one(
    schema: &TableSchema,
    rows: &mut BTreeMap<KeyTuple, Row>,
    mutation: Mutation,
) -> Result<()> {
    match mutation {
        Mutation::Insert { mut row, .. } => {
            let key = prepare_key(schema, &mut row)?;
            if rows.contains_key(&key) {
                return Err(Error::internal(format!(
                    "{}: row {} already exists",
                    schema.name, key
                )));
            }
            fill_generated(schema, &mut row, None);
            rows.insert(key, row);
        }
        Mutation::Update { row, .. } => {
            let key = schema.key_of(&row)?;
            let existing = rows
                .get_mut(&key)
                .ok_or_else(|| Error::not_found(format!("{}: row {}", schema.name, key)))?;
            merge_columns(schema, existing, &row);
        }
        Mutation::InsertOrUpdate { mut row, .. } => {
            let key = prepare_key(schema, &mut row)?;
            match rows.get_mut(&key) {
                Some(existing) => merge_columns(schema, existing, &row),
                None => {
                    fill_generated(schema, &mut row, None);
                    rows.insert(key, row);
                }
            }
        }
        Mutation::Replace { mut row, .. } => {
            let key = prepare_key(schema, &mut row)?;
            fill_generated(schema, &mut row, rows.get(&key));
            rows.insert(key, row);
        }
        Mutation::Delete { key, .. } => {
            rows.remove(&key);
        }
    }
    Ok(())
}

/// Apply mutations all-or-nothing; caller holds the write lock
fn apply_locked(tables: &mut Tables, mutations: Vec<Mutation>) -> Result<()> {
    let mut staged: BTreeMap<String, BTreeMap<KeyTuple, Row>> = BTreeMap::new();
    for mutation in mutations {
        let name = mutation.table().to_string();
        let table = tables.get(&name).ok_or_else(|| unknown_table(&name))?;
        let rows = staged
            .entry(name)
            .or_insert_with(|| table.rows.clone());
        apply_one(&table.schema, rows, mutation)?;
    }
    for (name, rows) in staged {
        if let Some(table) = tables.get_mut(&name) {
            table.rows = rows;
            table.version += 1;
        }
    }
    Ok(())
}

// ============================================================================
// Database
// ============================================================================

/// Counters exposed for tests and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Successful commits (transactions and batches)
    pub commits: u64,
    /// Commits rejected by validation
    pub conflicts: u64,
    /// Transaction attempts re-run after a conflict
    pub retries: u64,
}

/// In-memory implementation of the `Database` boundary
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
    retry: RetryConfig,
    commits: AtomicU64,
    conflicts: AtomicU64,
    retries: AtomicU64,
}

impl MemoryDatabase {
    /// Empty database with the default retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder-style [`create_table`](Self::create_table); replaces an existing
    /// table of the same name
    pub fn with_table(self, schema: TableSchema) -> Self {
        self.tables.write().insert(
            schema.name.clone(),
            Table {
                schema,
                rows: BTreeMap::new(),
                version: 0,
            },
        );
        self
    }

    /// Register a table
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the table exists or has no key columns.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        if schema.primary_key.is_empty() {
            return Err(Error::invalid_input(format!(
                "table '{}' needs at least one key column",
                schema.name
            )));
        }
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(Error::invalid_input(format!(
                "table '{}' already exists",
                schema.name
            )));
        }
        tables.insert(
            schema.name.clone(),
            Table {
                schema,
                rows: BTreeMap::new(),
                version: 0,
            },
        );
        Ok(())
    }

    /// Active retry policy
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// All rows of a table in primary key order
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` for an unknown table.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let table = tables.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(table.rows.values().cloned().collect())
    }

    /// Number of rows in a table (0 for an unknown table)
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Run a query, returning its rows and the version of every table it read
    fn query_at(&self, statement: &Statement) -> Result<(Vec<Row>, BTreeMap<String, u64>)> {
        let select = sql::parse(&statement.sql)?;
        let tables = self.tables.read();
        let snapshot = Snapshot {
            tables: &*tables,
            versions: RefCell::new(BTreeMap::new()),
        };
        let rows = sql::execute(&select, &snapshot, &statement.params)?;
        Ok((rows, snapshot.versions.into_inner()))
    }

    fn commit(&self, txn: MemoryTransaction<'_>) -> Result<()> {
        let mut tables = self.tables.write();
        for (name, read_version) in &txn.read_set {
            let current = tables.get(name).map(|t| t.version);
            if current != Some(*read_version) {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::conflict(format!(
                    "table '{}' changed since read (read v{}, now {:?})",
                    name, read_version, current
                )));
            }
        }
        if !txn.buffered.is_empty() {
            apply_locked(&mut tables, txn.buffered)?;
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Database for MemoryDatabase {
    fn single(&self, ctx: &Context) -> Result<Box<dyn ReadTransaction + '_>> {
        ctx.check()?;
        Ok(Box::new(SingleRead {
            db: self,
            ctx: ctx.clone(),
        }))
    }

    fn read_write_transaction(
        &self,
        ctx: &Context,
        f: &mut dyn FnMut(&mut dyn ReadWriteTransaction) -> Result<()>,
    ) -> Result<()> {
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            ctx.check()?;
            let mut txn = MemoryTransaction {
                db: self,
                ctx,
                read_set: HashMap::new(),
                buffered: Vec::new(),
            };
            let outcome = match f(&mut txn) {
                Ok(()) => ctx.check().and_then(|()| self.commit(txn)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < self.retry.max_retries => {
                    debug!(
                        target: "keystone::storage",
                        attempt,
                        backoff_ms = self.retry.backoff(attempt).as_millis() as u64,
                        error = %e,
                        "Retrying read-write transaction after conflict"
                    );
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    last_error = Some(e);
                    self.retry.wait(ctx, attempt)?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::internal("retry loop exited without a result")))
    }

    fn apply(&self, ctx: &Context, mutations: Vec<Mutation>) -> Result<()> {
        ctx.check()?;
        if mutations.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write();
        apply_locked(&mut tables, mutations)?;
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Read view over locked tables that remembers which tables were scanned
struct Snapshot<'t> {
    tables: &'t Tables,
    versions: RefCell<BTreeMap<String, u64>>,
}

impl sql::Catalog for Snapshot<'_> {
    fn scan(&self, name: &str) -> Result<Vec<&Row>> {
        let table = self.tables.get(name).ok_or_else(|| unknown_table(name))?;
        self.versions
            .borrow_mut()
            .insert(name.to_string(), table.version);
        Ok(table.rows.values().collect())
    }
}

// ============================================================================
// Transactions
// ============================================================================

struct SingleRead<'a> {
    db: &'a MemoryDatabase,
    ctx: Context,
}

impl ReadTransaction for SingleRead<'_> {
    fn query(&mut self, statement: &Statement) -> Result<RowIterator<'_>> {
        self.ctx.check()?;
        let (rows, _) = self.db.query_at(statement)?;
        Ok(RowIterator::from_rows(rows))
    }
}

struct MemoryTransaction<'a> {
    db: &'a MemoryDatabase,
    ctx: &'a Context,
    read_set: HashMap<String, u64>,
    buffered: Vec<Mutation>,
}

impl ReadTransaction for MemoryTransaction<'_> {
    fn query(&mut self, statement: &Statement) -> Result<RowIterator<'_>> {
        self.ctx.check()?;
        let (rows, versions) = self.db.query_at(statement)?;
        for (table, version) in versions {
            let recorded = *self.read_set.entry(table.clone()).or_insert(version);
            if recorded != version {
                return Err(Error::conflict(format!(
                    "table '{}' changed during the transaction",
                    table
                )));
            }
        }
        Ok(RowIterator::from_rows(rows))
    }
}

impl ReadWriteTransaction for MemoryTransaction<'_> {
    fn buffer(&mut self, mutations: Vec<Mutation>) -> Result<()> {
        self.buffered.extend(mutations);
        Ok(())
    }
}
