//! Core types and traits for Keystone
//!
//! This crate defines the vocabulary shared by every other crate:
//! - Error: error type with a stable kind classification
//! - Value / KeyTuple: column values and primary keys
//! - Row: a named-column result row with serde mapping
//! - Statement / Mutation: parameterized queries and buffered writes
//! - Context: cooperative cancellation and deadlines
//! - Traits: the executor / transaction boundary (Database)
//! - Cursor: opaque pagination tokens
//! - Template: compiled query templates that render placeholder names

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod cursor;
pub mod error;
pub mod row;
pub mod statement;
pub mod template;
pub mod traits;
pub mod value;

pub use context::Context;
pub use cursor::{
    decode_cursor, encode_cursor, next_offset_token, KeysetCursor, OffsetCursor, Page,
    PageRequest, CURSOR_VERSION,
};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use row::Row;
pub use statement::{Mutation, Statement};
pub use template::{bind_indexed, is_identifier, QueryTemplate, TemplateData, TemplateValue};
pub use traits::{Database, ReadTransaction, ReadWriteTransaction, RowIterator};
pub use value::{KeyTuple, Value};
