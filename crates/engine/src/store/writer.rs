//! Upsert, update and batch writes

use super::reader::{not_found, read_entity};
use super::EntityStore;
use crate::mapper::{IdRetrievable, Keyed, Mergeable, Updatable};
use keystone_core::{Context, Database, Mutation, ReadWriteTransaction, Result};
use tracing::debug;

/// Mutation persisting `incoming`, merged with `existing` when present
fn merged<M: Mergeable>(incoming: M::Entity, existing: Option<M::Entity>) -> Result<Mutation> {
    let entity = match existing {
        Some(existing) => M::merge(incoming, existing),
        None => incoming,
    };
    Mutation::insert_or_update(M::TABLE, &entity)
}

impl<D: Database> EntityStore<D> {
    /// Insert `entity`, or merge it into the stored row
    ///
    /// The read of the stored row and the write of the merged row share one
    /// transaction, so concurrent upserts on a key never lose an update.
    ///
    /// # Errors
    ///
    /// Returns a backend failure, `Conflict` once retries are exhausted, or a
    /// cancellation error.
    pub fn upsert<M: Mergeable>(&self, ctx: &Context, entity: M::Entity) -> Result<()> {
        let key = M::key_of(&entity);
        self.read_inspect_mutate::<M, _>(ctx, &key, |existing| {
            Ok(vec![merged::<M>(entity.clone(), existing)?])
        })
    }

    /// [`upsert`](Self::upsert) inside a caller-supplied transaction
    pub fn upsert_in<M: Mergeable>(
        &self,
        txn: &mut dyn ReadWriteTransaction,
        entity: M::Entity,
    ) -> Result<()> {
        let key = M::key_of(&entity);
        let existing = read_entity::<M, _>(txn, &key)?;
        txn.buffer(vec![merged::<M>(entity, existing)?])
    }

    /// Upsert, then look up the store-generated id of the persisted row
    ///
    /// When a concurrent writer created the row first, the incoming entity is
    /// merged into it and that row's id is returned.
    ///
    /// # Errors
    ///
    /// As [`upsert`](Self::upsert); `NotFound` if the row was removed between
    /// the upsert and the lookup.
    pub fn upsert_and_retrieve_id<M>(&self, ctx: &Context, entity: M::Entity) -> Result<M::Id>
    where
        M: Mergeable + IdRetrievable,
    {
        let key = M::key_of(&entity);
        self.upsert::<M>(ctx, entity)?;
        self.id_by_key::<M>(ctx, &key)
    }

    /// Apply an update request to an existing row
    ///
    /// Never creates a row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches the request's key, or the error
    /// returned by [`Updatable::apply_update`].
    pub fn update<M: Updatable>(&self, ctx: &Context, request: M::Request) -> Result<()> {
        let key = M::key_of_request(&request);
        self.read_inspect_mutate::<M, _>(ctx, &key, |existing| {
            let existing = existing.ok_or_else(|| not_found::<M>(&key))?;
            let updated = M::apply_update(request.clone(), existing)?;
            Ok(vec![Mutation::update(M::TABLE, &updated)?])
        })
    }

    /// Insert-or-update every entity in one atomic batch, without reading
    ///
    /// # Errors
    ///
    /// Returns the backend's error; no entity is written then.
    pub fn write_batch<M: Keyed>(&self, ctx: &Context, entities: &[M::Entity]) -> Result<()> {
        let mutations = entities
            .iter()
            .map(|entity| Mutation::insert_or_update(M::TABLE, entity))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            target: "keystone::store",
            table = M::TABLE,
            rows = mutations.len(),
            "write batch"
        );
        self.db.apply(ctx, mutations)
    }
}
