//! Table schemas for the in-memory backend

use keystone_core::{Error, KeyTuple, Result, Row, Value};

/// Shape of one table: its name, primary key columns and optional
/// store-generated id column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as used in `FROM` and in mutations
    pub name: String,
    /// Primary key columns, in key order
    pub primary_key: Vec<String>,
    /// Column filled with a fresh UUID when a new row leaves it empty
    pub generated_id: Option<String>,
}

impl TableSchema {
    /// Schema with the given primary key columns
    pub fn new(name: impl Into<String>, primary_key: &[&str]) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            generated_id: None,
        }
    }

    /// Declare a column whose value the store generates on insert
    pub fn with_generated_id(mut self, column: impl Into<String>) -> Self {
        self.generated_id = Some(column.into());
        self
    }

    /// Primary key of a row
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` if a key column is absent or NULL.
    pub fn key_of(&self, row: &Row) -> Result<KeyTuple> {
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for column in &self.primary_key {
            match row.get(column) {
                Some(Value::Null) | None => {
                    return Err(Error::internal(format!(
                        "{}: key column '{}' is missing",
                        self.name, column
                    )))
                }
                Some(value) => parts.push(value.clone()),
            }
        }
        Ok(KeyTuple::new(parts))
    }

    /// True if `column` is the generated id column
    pub fn is_generated(&self, column: &str) -> bool {
        self.generated_id.as_deref() == Some(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_of_composite() {
        let schema = TableSchema::new("Edges", &["GroupID", "WebFeatureID"]);
        let row = Row::new()
            .with("WebFeatureID", "f1")
            .with("GroupID", "g1")
            .with("Depth", 0i64);
        assert_eq!(
            schema.key_of(&row).unwrap(),
            KeyTuple::new(vec![Value::from("g1"), Value::from("f1")])
        );
    }

    #[test]
    fn test_key_of_rejects_null_key() {
        let schema = TableSchema::new("Leases", &["ResourceID"]);
        let row = Row::new().with("ResourceID", Value::Null);
        assert!(schema.key_of(&row).is_err());
    }
}
