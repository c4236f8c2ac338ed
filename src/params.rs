//! Parameter sources: where placeholder values come from.
//!
//! A source is read once per execution into an owned [`ParamMap`]. Lookups are
//! case-insensitive, and a missing name or a stored `Null` both resolve to null.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::SqlTemplateError;
use crate::types::SqlValue;

/// Insertion-ordered, case-insensitive name to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: Vec<(String, SqlValue)>,
    index: HashMap<String, usize>,
}

impl ParamMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any entry whose name differs only by case.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        let name = name.into();
        let value = value.into();
        let key = fold(&name);
        if let Some(idx) = self.index.get(&key).copied() {
            self.entries[idx] = (name, value);
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push((name, value));
        }
    }

    /// Builder-style [`ParamMap::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Case-insensitive lookup of the raw entry.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.index.get(&fold(name)).map(|&idx| &self.entries[idx].1)
    }

    /// Resolve a placeholder name; absent names and `Null` values both resolve to `None`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&SqlValue> {
        self.get(name).filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flatten the fields of any serializable struct into a map.
    ///
    /// # Errors
    /// Returns `ParameterError` if serialization fails and `InvalidArgument` if the value
    /// does not serialize to an object (or `null`).
    pub fn from_fields<T: Serialize + ?Sized>(fields: &T) -> Result<Self, SqlTemplateError> {
        let value = serde_json::to_value(fields)
            .map_err(|e| SqlTemplateError::ParameterError(format!("serializing fields: {e}")))?;
        Self::from_json(value)
    }

    fn from_json(value: JsonValue) -> Result<Self, SqlTemplateError> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(fields) => Ok(fields
                .into_iter()
                .map(|(name, value)| (name, SqlValue::from_json(value)))
                .collect()),
            other => Err(SqlTemplateError::InvalidArgument(format!(
                "parameter source must be an object with named fields, got `{other}`"
            ))),
        }
    }
}

fn fold(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Anything that can supply named placeholder values.
pub trait ParameterSource {
    /// Read the source into an owned, case-insensitive map.
    ///
    /// # Errors
    /// Returns `SqlTemplateError` when the source cannot be viewed as named values.
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError>;
}

impl ParameterSource for ParamMap {
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        Ok(self.clone())
    }
}

impl<K, V, S> ParameterSource for HashMap<K, V, S>
where
    K: AsRef<str>,
    V: Clone + Into<SqlValue>,
{
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        Ok(self
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.clone()))
            .collect())
    }
}

impl<K, V> ParameterSource for BTreeMap<K, V>
where
    K: AsRef<str>,
    V: Clone + Into<SqlValue>,
{
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        Ok(self
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.clone()))
            .collect())
    }
}

impl<K, V> ParameterSource for [(K, V)]
where
    K: AsRef<str>,
    V: Clone + Into<SqlValue>,
{
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        Ok(self
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.clone()))
            .collect())
    }
}

impl<K, V> ParameterSource for Vec<(K, V)>
where
    K: AsRef<str>,
    V: Clone + Into<SqlValue>,
{
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        self.as_slice().to_param_map()
    }
}

impl ParameterSource for JsonValue {
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        ParamMap::from_json(self.clone())
    }
}

impl<P: ParameterSource> ParameterSource for Option<P> {
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        match self {
            Some(source) => source.to_param_map(),
            None => Ok(ParamMap::new()),
        }
    }
}

impl<P: ParameterSource + ?Sized> ParameterSource for &P {
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        (**self).to_param_map()
    }
}

/// Use the named fields of a serializable value as parameters.
///
/// ```rust
/// use serde::Serialize;
/// use templated_sql::prelude::*;
///
/// #[derive(Serialize)]
/// struct Filter { id: i64, name: Option<String> }
///
/// let map = Fields(&Filter { id: 7, name: None }).to_param_map().unwrap();
/// assert_eq!(map.resolve("ID"), Some(&SqlValue::Int(7)));
/// assert_eq!(map.resolve("name"), None);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> ParameterSource for Fields<'_, T> {
    fn to_param_map(&self) -> Result<ParamMap, SqlTemplateError> {
        ParamMap::from_fields(self.0)
    }
}
