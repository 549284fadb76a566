//! Keystone - generic entity store over a transactional relational store
//!
//! Keystone gives every entity type a uniform way to be read by key, upserted
//! with merge semantics, updated and removed, and builds two coordination
//! primitives on top: TTL leases and a hierarchy denormalizer.
//!
//! # Quick Start
//!
//! ```ignore
//! use keystone::{Context, Keystone, KeystoneConfig};
//! use std::time::Duration;
//!
//! let ks = Keystone::ephemeral(KeystoneConfig::default())?;
//! let ctx = Context::background();
//!
//! let lease = ks.leases().try_acquire(&ctx, "ingest-2024-05", "worker-1", Duration::from_secs(30))?;
//! ks.leases().release(&ctx, "ingest-2024-05", "worker-1")?;
//! ```
//!
//! # Architecture
//!
//! - `keystone-core`: values, rows, statements, errors, cursors, templates and
//!   the transaction boundary traits
//! - `keystone-storage`: the in-memory OCC backend
//! - `keystone-engine`: mapper contract, `EntityStore`, configuration
//! - `keystone-primitives`: leases, the denormalizer and entity mappers

mod handle;

pub use handle::Keystone;

pub use keystone_core::{
    Context, Database, Error, ErrorKind, KeyTuple, Mutation, Page, PageRequest, QueryTemplate,
    ReadTransaction, ReadWriteTransaction, Result, Row, Statement, TemplateData, Value,
};
pub use keystone_engine::{
    DenormalizerConfig, EntityStore, IdRetrievable, KeystoneConfig, Keyed, LeaseConfig, Mergeable,
    PaginationConfig, Removable, RetryConfig, Updatable, CONFIG_FILE_NAME,
};
pub use keystone_primitives::{
    Clock, DenormalizeReport, HierarchyDenormalizer, HierarchyInput, LeaseCoordinator,
    LeaseRecord, ManualClock, MissingOneImplementationQuery, SavedSearches, SystemClock,
};
pub use keystone_storage::{MemoryDatabase, TableSchema};
