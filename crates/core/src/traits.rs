//! Statement executor and transaction boundary
//!
//! These traits are the only surface the entity store consumes from the
//! underlying database. Any backend that can execute a parameterized
//! statement inside a transaction and apply buffered mutations atomically can
//! sit behind them.
//!
//! ```text
//! Database::single(ctx)                 -> BeginReadOnly
//! Database::read_write_transaction(f)   -> BeginReadWrite(fn); fn's error aborts
//! Database::apply(mutations)            -> blind atomic batch
//! ReadTransaction::query(stmt)          -> RowIterator (row | Done | err)
//! ReadWriteTransaction::buffer(m)       -> applied at commit
//! ```

use crate::context::Context;
use crate::error::Result;
use crate::row::Row;
use crate::statement::{Mutation, Statement};
use std::sync::Arc;

/// Lazy sequence of rows produced by a statement
///
/// `next()` yields `Some(Ok(row))`, `Some(Err(e))`, or `None` once done.
pub struct RowIterator<'a> {
    inner: Box<dyn Iterator<Item = Result<Row>> + 'a>,
}

impl<'a> RowIterator<'a> {
    /// Wrap any row iterator
    pub fn new(inner: impl Iterator<Item = Result<Row>> + 'a) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Iterator over already materialized rows
    pub fn from_rows(rows: Vec<Row>) -> RowIterator<'static> {
        RowIterator::new(rows.into_iter().map(Ok))
    }

    /// Next row, `Ok(None)` when done
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        self.inner.next().transpose()
    }
}

impl Iterator for RowIterator<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Read access inside a transaction
pub trait ReadTransaction {
    /// Execute a parameterized query
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` on execution failure.
    fn query(&mut self, statement: &Statement) -> Result<RowIterator<'_>>;
}

/// Read-write access inside a transaction
///
/// Buffered mutations become visible atomically at commit; reads inside the
/// same transaction do not observe them.
pub trait ReadWriteTransaction: ReadTransaction {
    /// Buffer mutations for commit
    ///
    /// # Errors
    ///
    /// Returns an error if the mutations are malformed for the backend.
    fn buffer(&mut self, mutations: Vec<Mutation>) -> Result<()>;
}

/// Transaction boundary of the underlying store
pub trait Database: Send + Sync {
    /// Begin a single-use read-only transaction
    ///
    /// # Errors
    ///
    /// Returns `Cancelled`/`DeadlineExceeded` if `ctx` is done.
    fn single(&self, ctx: &Context) -> Result<Box<dyn ReadTransaction + '_>>;

    /// Run `f` inside a read-write transaction and commit its mutations
    ///
    /// An error returned by `f` aborts the transaction and is returned
    /// unchanged. Backends may invoke `f` more than once when a commit
    /// conflicts; only the final attempt's mutations are ever applied.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, `Conflict` when retries are exhausted, or a
    /// cancellation error if `ctx` is done before commit.
    fn read_write_transaction(
        &self,
        ctx: &Context,
        f: &mut dyn FnMut(&mut dyn ReadWriteTransaction) -> Result<()>,
    ) -> Result<()>;

    /// Apply a batch of mutations atomically without reading
    ///
    /// # Errors
    ///
    /// Returns an error if any mutation fails; no mutation is applied then.
    fn apply(&self, ctx: &Context, mutations: Vec<Mutation>) -> Result<()>;
}

impl<D: Database + ?Sized> Database for Arc<D> {
    fn single(&self, ctx: &Context) -> Result<Box<dyn ReadTransaction + '_>> {
        (**self).single(ctx)
    }

    fn read_write_transaction(
        &self,
        ctx: &Context,
        f: &mut dyn FnMut(&mut dyn ReadWriteTransaction) -> Result<()>,
    ) -> Result<()> {
        (**self).read_write_transaction(ctx, f)
    }

    fn apply(&self, ctx: &Context, mutations: Vec<Mutation>) -> Result<()> {
        (**self).apply(ctx, mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_row_iterator_yields_then_done() {
        let mut it = RowIterator::from_rows(vec![Row::new().with("A", 1i64)]);
        assert!(it.next_row().unwrap().is_some());
        assert!(it.next_row().unwrap().is_none());
    }

    #[test]
    fn test_row_iterator_surfaces_errors() {
        let mut it = RowIterator::new(vec![Err(Error::internal("boom"))].into_iter());
        assert!(it.next_row().is_err());
    }
}
