//! Parameterized statements and buffered mutations
//!
//! A [`Statement`] is query text plus a map of bound parameters. Query text is
//! only ever syntax and placeholder names (`@featureKey`); every caller-supplied
//! value travels through [`Statement::params`].
//!
//! A [`Mutation`] is a table-level write buffered inside a read-write
//! transaction (or applied as a blind batch).

use crate::error::Result;
use crate::row::Row;
use crate::value::{KeyTuple, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Query text with bound parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    /// Query text; placeholders are written `@name`
    pub sql: String,
    /// Bound parameter values keyed by placeholder name (without `@`)
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    /// Statement without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Bind a parameter, builder style
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Bind a parameter in place
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(name.into(), value.into());
    }

    /// Bound value for a placeholder
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            write!(f, " [")?;
            for (i, (name, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "@{}={}", name, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// A buffered table write
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new row; fails if the key exists
    Insert {
        /// Target table
        table: String,
        /// Columns to write
        row: Row,
    },
    /// Update an existing row's listed columns; fails if the key is absent
    Update {
        /// Target table
        table: String,
        /// Key columns plus the columns to overwrite
        row: Row,
    },
    /// Insert, or overwrite the listed columns of an existing row
    InsertOrUpdate {
        /// Target table
        table: String,
        /// Columns to write
        row: Row,
    },
    /// Insert, or replace the whole existing row
    Replace {
        /// Target table
        table: String,
        /// Columns to write
        row: Row,
    },
    /// Delete the row with the given primary key, if present
    Delete {
        /// Target table
        table: String,
        /// Primary key tuple
        key: KeyTuple,
    },
}

impl Mutation {
    /// Insert-or-update built from a serializable entity
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the entity does not serialize to flat columns.
    pub fn insert_or_update<T: Serialize>(table: impl Into<String>, entity: &T) -> Result<Self> {
        Ok(Mutation::InsertOrUpdate {
            table: table.into(),
            row: Row::from_struct(entity)?,
        })
    }

    /// Insert built from a serializable entity
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the entity does not serialize to flat columns.
    pub fn insert<T: Serialize>(table: impl Into<String>, entity: &T) -> Result<Self> {
        Ok(Mutation::Insert {
            table: table.into(),
            row: Row::from_struct(entity)?,
        })
    }

    /// Update built from a serializable entity
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the entity does not serialize to flat columns.
    pub fn update<T: Serialize>(table: impl Into<String>, entity: &T) -> Result<Self> {
        Ok(Mutation::Update {
            table: table.into(),
            row: Row::from_struct(entity)?,
        })
    }

    /// Delete by primary key
    pub fn delete(table: impl Into<String>, key: KeyTuple) -> Self {
        Mutation::Delete {
            table: table.into(),
            key,
        }
    }

    /// Table this mutation targets
    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert { table, .. }
            | Mutation::Update { table, .. }
            | Mutation::InsertOrUpdate { table, .. }
            | Mutation::Replace { table, .. }
            | Mutation::Delete { table, .. } => table,
        }
    }
}
