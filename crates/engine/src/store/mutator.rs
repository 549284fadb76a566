//! Read-inspect-mutate and deletes

use super::reader::{not_found, read_entity};
use super::EntityStore;
use crate::mapper::{Keyed, Removable};
use keystone_core::{Context, Database, Mutation, ReadWriteTransaction, Result};
use tracing::debug;

impl<D: Database> EntityStore<D> {
    /// Read the row under `key`, let `inspect` decide, apply its mutations
    ///
    /// The read and the returned mutations commit in one transaction.
    /// `inspect` receives `None` when the row is absent. An error from
    /// `inspect` aborts the transaction with no side effect and is returned
    /// unchanged, so callers can branch on its kind.
    ///
    /// `inspect` runs once per attempt; a conflicting commit re-runs it
    /// against a fresh read.
    ///
    /// # Errors
    ///
    /// Returns the inspector's error, a backend failure, `Conflict` once
    /// retries are exhausted, or a cancellation error.
    pub fn read_inspect_mutate<M, F>(&self, ctx: &Context, key: &M::Key, mut inspect: F) -> Result<()>
    where
        M: Keyed,
        F: FnMut(Option<M::Entity>) -> Result<Vec<Mutation>>,
    {
        let mut attempts = 0u32;
        let result = self.db.read_write_transaction(ctx, &mut |txn| {
            attempts += 1;
            let existing = read_entity::<M, _>(txn, key)?;
            let mutations = inspect(existing)?;
            txn.buffer(mutations)
        });
        debug!(
            target: "keystone::store",
            table = M::TABLE,
            key = ?key,
            attempts,
            ok = result.is_ok(),
            "read-inspect-mutate"
        );
        result
    }

    /// [`read_inspect_mutate`](Self::read_inspect_mutate) inside a caller-supplied
    /// transaction; commit is left to the caller
    pub fn read_inspect_mutate_in<M, F>(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        key: &M::Key,
        inspect: F,
    ) -> Result<()>
    where
        M: Keyed,
        F: FnOnce(Option<M::Entity>) -> Result<Vec<Mutation>>,
    {
        let existing = read_entity::<M, _>(txn, key)?;
        let mutations = inspect(existing)?;
        txn.buffer(mutations)
    }

    /// Delete the row under `key`; absent rows are not an error
    ///
    /// # Errors
    ///
    /// Returns a backend failure or a cancellation error.
    pub fn remove<M: Removable>(&self, ctx: &Context, key: &M::Key) -> Result<()> {
        self.read_inspect_mutate::<M, _>(ctx, key, |_| {
            Ok(vec![Mutation::delete(M::TABLE, M::delete_key_of(key))])
        })
    }

    /// Delete the row under `key`, surfacing `NotFound` if it is already gone
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches.
    pub fn remove_existing<M: Removable>(&self, ctx: &Context, key: &M::Key) -> Result<()> {
        self.read_inspect_mutate::<M, _>(ctx, key, |existing| match existing {
            Some(_) => Ok(vec![Mutation::delete(M::TABLE, M::delete_key_of(key))]),
            None => Err(not_found::<M>(key)),
        })
    }
}
