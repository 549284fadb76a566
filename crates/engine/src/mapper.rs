//! Entity mapper contract
//!
//! A mapper is a stateless, usually zero-sized type that binds one entity type
//! to one key type and one table. The generic [`EntityStore`] is written only
//! against these traits; each store operation asks for exactly the capability
//! it needs, so a mapper implements only what its call sites use:
//!
//! | Capability | Unlocks |
//! |------------|---------|
//! | [`Keyed`] | `read_by_key`, `read_all`, `list_page`, `write_batch`, `read_inspect_mutate` |
//! | [`Mergeable`] | `upsert`, `upsert_in` |
//! | [`Updatable`] | `update` |
//! | [`Removable`] | `remove`, `remove_existing` |
//! | [`IdRetrievable`] | `upsert_and_retrieve_id`, `id_by_key` |
//!
//! A missing capability is a compile error at the call site.
//!
//! [`EntityStore`]: crate::store::EntityStore

use keystone_core::{KeyTuple, Result, Row, Statement};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Table location, key extraction and point lookup for one entity type
pub trait Keyed {
    /// Row type; columns map to fields through serde
    type Entity: Serialize + DeserializeOwned + Clone;
    /// Natural key of one row
    type Key: Clone + Debug;

    /// Table the entity lives in
    const TABLE: &'static str;

    /// Natural key of a full entity
    fn key_of(entity: &Self::Entity) -> Self::Key;

    /// Point lookup matching at most one row
    fn select_by_key(key: &Self::Key) -> Statement;
}

/// Decides what to persist when the row already exists
///
/// `merge` may ignore `incoming` entirely ("exists, do nothing") or overwrite
/// selected fields. When no row exists the incoming entity is written as is.
pub trait Mergeable: Keyed {
    /// Entity to persist given the incoming and stored versions
    fn merge(incoming: Self::Entity, existing: Self::Entity) -> Self::Entity;
}

/// Applies an external update request to an existing row
pub trait Updatable: Keyed {
    /// Caller-facing update payload
    type Request: Clone;

    /// Key of the row the request targets
    fn key_of_request(request: &Self::Request) -> Self::Key;

    /// Updated entity
    ///
    /// # Errors
    ///
    /// An error aborts the update transaction and is returned unchanged.
    fn apply_update(request: Self::Request, existing: Self::Entity) -> Result<Self::Entity>;
}

/// Primary key tuple for deletes
pub trait Removable: Keyed {
    /// Primary key of the row addressed by `key`
    fn delete_key_of(key: &Self::Key) -> KeyTuple;
}

/// Extracts a store-generated surrogate id
pub trait IdRetrievable: Keyed {
    /// Surrogate id type
    type Id;

    /// Id column of a row returned by `select_by_key`
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` if the row carries no usable id.
    fn id_from_row(row: &Row) -> Result<Self::Id>;
}
