//! Rows returned by statement execution
//!
//! A [`Row`] is an ordered list of named columns. Entities move in and out of
//! rows through serde: [`Row::from_struct`] flattens a serializable struct into
//! columns, [`Row::to_struct`] rebuilds one. Columns the target struct does not
//! declare are ignored, so a row carrying a generated `ID` column still decodes
//! into an entity that omits it.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// One result row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row from parallel column and value lists
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the lists differ in length.
    pub fn from_parts(columns: Vec<String>, values: Vec<Value>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(Error::invalid_input(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Builder-style column append
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing an existing value of the same name
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.position(&column) {
            Some(i) => self.values[i] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Column value by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|i| &self.values[i])
    }

    /// Column value by name, or `InternalQueryFailure` if absent
    pub fn column(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| Error::internal(format!("row has no column '{}'", column)))
    }

    /// String column by name
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` if the column is absent or not a string.
    pub fn get_string(&self, column: &str) -> Result<String> {
        match self.column(column)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(Error::internal(format!(
                "column '{}' is {}, expected String",
                column,
                other.type_name()
            ))),
        }
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterate `(column, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keep only the named columns, in the given order
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` for a column the row does not have.
    pub fn project(&self, columns: &[String]) -> Result<Row> {
        let mut out = Row::new();
        for column in columns {
            out.set(column.clone(), self.column(column)?.clone());
        }
        Ok(out)
    }

    /// Decode this row into a struct
    ///
    /// # Errors
    ///
    /// Returns `InternalQueryFailure` if the columns do not match the struct.
    pub fn to_struct<T: DeserializeOwned>(&self) -> Result<T> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| Error::query("decoding row into struct", e))
    }

    /// Encode a struct into a row, one column per top-level field
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the value does not serialize to a flat object.
    pub fn from_struct<T: Serialize>(value: &T) -> Result<Row> {
        let json = serde_json::to_value(value)
            .map_err(|e| Error::invalid_input(format!("entity does not serialize: {}", e)))?;
        let object = match json {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(Error::invalid_input(format!(
                    "entity must serialize to an object, got {}",
                    other
                )))
            }
        };
        let mut row = Row::new();
        for (column, json) in object {
            let value = Value::from_json(json).ok_or_else(|| {
                Error::invalid_input(format!("column '{}' is not a scalar or array", column))
            })?;
            row.set(column, value);
        }
        Ok(row)
    }
}
