//! Name-keyed result rows

use std::collections::BTreeMap;

use rusqlite::types::{Value, ValueRef};

use crate::{Error, Result};

/// A result row keyed by column name.
///
/// Column order of the underlying statement is not significant; two rows are
/// equal when they map the same names to the same values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from a rusqlite row using the statement's column names
    pub(crate) fn from_sql(names: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut values = BTreeMap::new();
        for (idx, name) in names.iter().enumerate() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Real(f) => Value::Real(f),
                ValueRef::Text(t) => {
                    let text = std::str::from_utf8(t).map_err(rusqlite::Error::Utf8Error)?;
                    Value::Text(text.to_owned())
                }
                ValueRef::Blob(b) => Value::Blob(b.to_vec()),
            };
            // Later duplicates (e.g. joined key columns) hold the same value
            values.entry(name.clone()).or_insert(value);
        }
        Ok(Self { values })
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    fn require(&self, column: &str) -> Result<&Value> {
        self.values.get(column).ok_or_else(|| Error::Column {
            column: column.to_string(),
            problem: "missing from row".to_string(),
        })
    }

    fn mismatch(column: &str, expected: &str, found: &Value) -> Error {
        Error::Column {
            column: column.to_string(),
            problem: format!("expected {}, found {:?}", expected, found.data_type()),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64> {
        match self.require(column)? {
            Value::Integer(i) => Ok(*i),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    /// Real value; integers are widened since SQLite may store `1500.0` as `1500`
    pub fn real(&self, column: &str) -> Result<f64> {
        match self.require(column)? {
            Value::Real(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(Self::mismatch(column, "real", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String> {
        match self.require(column)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            other => Err(Self::mismatch(column, "text or null", other)),
        }
    }

    pub fn blob(&self, column: &str) -> Result<Vec<u8>> {
        match self.require(column)? {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(Self::mismatch(column, "blob", other)),
        }
    }

    pub fn opt_blob(&self, column: &str) -> Result<Option<Vec<u8>>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Blob(b) => Ok(Some(b.clone())),
            other => Err(Self::mismatch(column, "blob or null", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut row = Row::new();
        row.insert("Name", Value::Text("Mouse".into()));
        row.insert("Price", Value::Integer(25));
        row.insert("Image", Value::Null);

        assert_eq!(row.text("Name").unwrap(), "Mouse");
        assert_eq!(row.real("Price").unwrap(), 25.0);
        assert_eq!(row.opt_blob("Image").unwrap(), None);
        assert!(matches!(row.integer("Name"), Err(Error::Column { .. })));
        assert!(matches!(row.text("Missing"), Err(Error::Column { .. })));
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut a = Row::new();
        a.insert("x", Value::Integer(1));
        a.insert("y", Value::Text("t".into()));
        let mut b = Row::new();
        b.insert("y", Value::Text("t".into()));
        b.insert("x", Value::Integer(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_utf8_text_is_an_error() {
        let gateway = crate::storage::Gateway::open_in_memory().unwrap();
        let result = gateway.select("SELECT CAST(X'48FF' AS TEXT) AS Name", [], crate::storage::Fetch::All);
        assert!(matches!(result, Err(Error::Storage(rusqlite::Error::Utf8Error(_)))));

        let rows = gateway
            .select("SELECT CAST(X'4869' AS TEXT) AS Name", [], crate::storage::Fetch::All)
            .unwrap();
        assert_eq!(rows[0].text("Name").unwrap(), "Hi");
    }
}
