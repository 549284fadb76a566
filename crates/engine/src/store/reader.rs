//! Point lookups and scans

use super::EntityStore;
use crate::mapper::{IdRetrievable, Keyed};
use keystone_core::{Context, Database, Error, ReadTransaction, Result, Row, Statement};

/// First row of a statement, if any
pub(crate) fn read_row<T>(txn: &mut T, statement: &Statement) -> Result<Option<Row>>
where
    T: ReadTransaction + ?Sized,
{
    let mut rows = txn.query(statement)?;
    rows.next_row()
}

/// Entity stored under `key`, if any
pub(crate) fn read_entity<M, T>(txn: &mut T, key: &M::Key) -> Result<Option<M::Entity>>
where
    M: Keyed,
    T: ReadTransaction + ?Sized,
{
    match read_row(txn, &M::select_by_key(key))? {
        Some(row) => row.to_struct().map(Some),
        None => Ok(None),
    }
}

pub(crate) fn not_found<M: Keyed>(key: &M::Key) -> Error {
    Error::not_found(format!("{} {:?}", M::TABLE, key))
}

impl<D: Database> EntityStore<D> {
    /// Entity stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches, `InternalQueryFailure` when the
    /// query or row decoding fails.
    pub fn read_by_key<M: Keyed>(&self, ctx: &Context, key: &M::Key) -> Result<M::Entity> {
        let mut txn = self.db.single(ctx)?;
        self.read_by_key_in::<M, _>(&mut *txn, key)
    }

    /// [`read_by_key`](Self::read_by_key) inside a caller-supplied transaction
    pub fn read_by_key_in<M, T>(&self, txn: &mut T, key: &M::Key) -> Result<M::Entity>
    where
        M: Keyed,
        T: ReadTransaction + ?Sized,
    {
        read_entity::<M, T>(txn, key)?.ok_or_else(|| not_found::<M>(key))
    }

    /// Every row of `statement`, decoded
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` when the query or any row fails.
    pub fn read_all<M: Keyed>(&self, ctx: &Context, statement: &Statement) -> Result<Vec<M::Entity>> {
        let mut txn = self.db.single(ctx)?;
        self.read_all_in::<M, _>(&mut *txn, statement)
    }

    /// [`read_all`](Self::read_all) inside a caller-supplied transaction
    pub fn read_all_in<M, T>(&self, txn: &mut T, statement: &Statement) -> Result<Vec<M::Entity>>
    where
        M: Keyed,
        T: ReadTransaction + ?Sized,
    {
        txn.query(statement)?
            .map(|row| row.and_then(|r| r.to_struct()))
            .collect()
    }

    /// Store-generated id of the row under `key`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches.
    pub fn id_by_key<M: IdRetrievable>(&self, ctx: &Context, key: &M::Key) -> Result<M::Id> {
        let mut txn = self.db.single(ctx)?;
        let row = read_row(&mut *txn, &M::select_by_key(key))?.ok_or_else(|| not_found::<M>(key))?;
        M::id_from_row(&row)
    }
}
