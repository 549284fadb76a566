//! Storage layer for Keystone
//!
//! This crate implements an in-memory backend for the `Database` boundary:
//! - MemoryDatabase: ordered tables behind a `parking_lot::RwLock`
//! - Optimistic read-set validation with first-committer-wins
//! - RetryConfig: context-aware exponential backoff for conflicting transactions
//! - TableSchema: primary keys and store-generated id columns
//! - Single-table `SELECT`s, parsed by `sqlparser` and evaluated over table
//!   rows, with correlated `EXISTS` subqueries
//!
//! The backend is used by every test suite in the workspace and is usable
//! as an embedded store wherever the data fits in memory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod retry;
pub mod schema;
mod sql;

pub use memory::{MemoryDatabase, MemoryStats};
pub use retry::RetryConfig;
pub use schema::TableSchema;
