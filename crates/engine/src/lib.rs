//! Entity store engine for Keystone
//!
//! This crate provides:
//! - Mapper contract: Keyed, Mergeable, Updatable, Removable, IdRetrievable
//! - EntityStore: generic read/upsert/update/remove over any `Database`
//! - read_inspect_mutate: the single read-modify-write primitive
//! - Offset and keyset pagination with opaque cursors
//! - KeystoneConfig: `keystone.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod mapper;
pub mod store;

pub use config::{
    DenormalizerConfig, KeystoneConfig, LeaseConfig, PaginationConfig, CONFIG_FILE_NAME,
};
pub use keystone_storage::RetryConfig;
pub use mapper::{IdRetrievable, Keyed, Mergeable, Removable, Updatable};
pub use store::{EntityStore, PAGE_OFFSET_PARAM, PAGE_SIZE_PARAM};
