use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::SqlValue;

/// Column names of one result set, shared by every row read from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    // upper-cased name -> first index carrying it
    index: HashMap<String, usize>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.to_ascii_uppercase()).or_insert(i);
        }
        Self { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Case-insensitive position of a column; duplicates resolve to the first.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_uppercase()).copied()
    }
}

/// A row with no fixed schema: one entry per column, in column order.
///
/// ```rust
/// use std::sync::Arc;
/// use templated_sql::prelude::*;
///
/// let columns = Arc::new(Columns::new(vec!["x".into(), "y".into()]));
/// let record = DynamicRecord::new(columns, vec![SqlValue::Int(1), SqlValue::Null]);
/// assert_eq!(record.get("X"), Some(&SqlValue::Int(1)));
/// assert!(record.get("y").is_some_and(SqlValue::is_null));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    columns: Arc<Columns>,
    values: Vec<SqlValue>,
}

impl DynamicRecord {
    /// Pair column names with values. Missing trailing values read as `Null`.
    #[must_use]
    pub fn new(columns: Arc<Columns>, mut values: Vec<SqlValue>) -> Self {
        values.resize(columns.len(), SqlValue::Null);
        Self { columns, values }
    }

    /// A record carrying only the shape of a result set: every value is `Null`.
    #[must_use]
    pub fn empty_shape(columns: Arc<Columns>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Get a value by column name (case-insensitive).
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.position(column).and_then(|idx| self.values.get(idx))
    }

    /// Get a value by column position.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

impl Serialize for DynamicRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Arc<Columns> {
        Arc::new(Columns::new(names.iter().map(|s| (*s).to_owned()).collect()))
    }

    #[test]
    fn keeps_column_order_and_duplicates() {
        let record = DynamicRecord::new(
            columns(&["b", "a", "B"]),
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)],
        );
        let names: Vec<_> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "B"]);
        assert_eq!(record.get("B"), Some(&SqlValue::Int(1)));
        assert_eq!(record.get_by_index(2), Some(&SqlValue::Int(3)));
    }

    #[test]
    fn empty_shape_is_all_null() {
        let record = DynamicRecord::empty_shape(columns(&["name", "age"]));
        assert_eq!(record.len(), 2);
        assert!(record.values().iter().all(SqlValue::is_null));
        assert!(record.get("nonexistent").is_none());
    }

    #[test]
    fn serializes_as_json_object() {
        let record = DynamicRecord::new(
            columns(&["x", "y"]),
            vec![SqlValue::Int(1), SqlValue::Null],
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"x": 1, "y": null}));
    }
}
