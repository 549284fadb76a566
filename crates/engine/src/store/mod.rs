//! Generic entity store
//!
//! `EntityStore` serves every entity type through the mapper contract in
//! [`crate::mapper`]. Operations are split by role:
//!
//! - reader: point lookups and full scans, standalone or inside a transaction
//! - writer: upsert with merge, update, id retrieval, blind batch writes
//! - mutator: the read-inspect-mutate primitive and deletes
//! - list: offset and keyset pagination with opaque cursors
//!
//! ## Transactions
//!
//! Read-write transactions are opened in exactly one place,
//! [`EntityStore::read_inspect_mutate`]. Upsert, update and remove are thin
//! inspectors on top of it. The backend may run an inspector more than once
//! when its commit conflicts, so inspectors must not have side effects outside
//! the mutations they return.

mod list;
mod mutator;
mod reader;
mod writer;

pub use list::{PAGE_OFFSET_PARAM, PAGE_SIZE_PARAM};

use crate::config::PaginationConfig;
use keystone_core::Database;

/// Entity store over any [`Database`] backend
#[derive(Debug, Clone)]
pub struct EntityStore<D> {
    db: D,
    pagination: PaginationConfig,
}

impl<D: Database> EntityStore<D> {
    /// Store with default pagination bounds
    pub fn new(db: D) -> Self {
        Self {
            db,
            pagination: PaginationConfig::default(),
        }
    }

    /// Replace the pagination bounds
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Underlying backend
    pub fn database(&self) -> &D {
        &self.db
    }

    /// Active pagination bounds
    pub fn pagination(&self) -> &PaginationConfig {
        &self.pagination
    }
}
