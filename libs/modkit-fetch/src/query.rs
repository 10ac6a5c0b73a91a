//! Query-string encoding.
//!
//! A query source is either a pre-built [`QueryValues`] multimap or a record
//! implementing [`QueryEncode`] (usually via `#[derive(QueryEncode)]`).
//! Both end up in a `QueryValues`, whose encoding is sorted by key so the
//! same input always yields the same string.

use crate::error::HttpError;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

const QUERY_CONTEXT: &str = "query string";

/// Ordered key/value multimap, the analogue of a URL values table.
///
/// Keys are kept sorted; values under one key keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    entries: BTreeMap<String, Vec<String>>,
}

impl QueryValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`, keeping existing ones.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Replace all values under `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values stored under `key`, in insertion order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
    }

    /// Percent-encode as `k=v&k=v`, sorted by key.
    ///
    /// # Errors
    /// Returns `HttpError::Encoding` if the serializer rejects the pairs.
    pub fn encode(&self) -> Result<String, HttpError> {
        let pairs: Vec<(&str, &str)> = self.iter().collect();
        serde_urlencoded::to_string(pairs).map_err(|e| HttpError::encoding(QUERY_CONTEXT, e))
    }
}

impl<K, V> FromIterator<(K, V)> for QueryValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (key, value) in iter {
            values.add(key, value);
        }
        values
    }
}

/// Scalar-to-string conversion used for record fields.
///
/// This is display formatting, not JSON: strings are emitted verbatim,
/// numbers and booleans via `Display`, `None` as the empty string.
pub trait QueryValue {
    fn to_query_value(&self) -> String;
}

macro_rules! display_query_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl QueryValue for $ty {
                fn to_query_value(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_query_value!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

impl QueryValue for str {
    fn to_query_value(&self) -> String {
        self.to_owned()
    }
}

impl QueryValue for String {
    fn to_query_value(&self) -> String {
        self.clone()
    }
}

impl QueryValue for Cow<'_, str> {
    fn to_query_value(&self) -> String {
        self.clone().into_owned()
    }
}

impl<T: QueryValue> QueryValue for Option<T> {
    fn to_query_value(&self) -> String {
        self.as_ref().map(QueryValue::to_query_value).unwrap_or_default()
    }
}

impl<T: QueryValue + ?Sized> QueryValue for &T {
    fn to_query_value(&self) -> String {
        (**self).to_query_value()
    }
}

impl<T: QueryValue + ?Sized> QueryValue for Box<T> {
    fn to_query_value(&self) -> String {
        (**self).to_query_value()
    }
}

impl<T: QueryValue + ?Sized> QueryValue for Arc<T> {
    fn to_query_value(&self) -> String {
        (**self).to_query_value()
    }
}

/// A record that can write its fields into a [`QueryValues`].
///
/// Derive it with `#[derive(QueryEncode)]`. Field attributes:
///
/// - `#[query(rename = "key")]`: explicit key (default: the field name lower-cased)
/// - `#[query(omitempty)]`: skip the field when its string form is empty
/// - `#[query(skip)]`: never encode the field
/// - `#[query(squash)]`: encode the field's own fields into the parent
///
/// Only `pub` fields are encoded.
pub trait QueryEncode {
    /// Append this record's pairs to `values`.
    ///
    /// # Errors
    /// Returns `HttpError::Encoding` if the value is not a record.
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError>;

    /// Collect into a fresh [`QueryValues`].
    ///
    /// # Errors
    /// See [`QueryEncode::append_pairs`].
    fn to_query_values(&self) -> Result<QueryValues, HttpError> {
        let mut values = QueryValues::new();
        self.append_pairs(&mut values)?;
        Ok(values)
    }
}

impl QueryEncode for QueryValues {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        for (key, value) in self.iter() {
            values.add(key, value);
        }
        Ok(())
    }
}

impl<T: QueryEncode + ?Sized> QueryEncode for &T {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        (**self).append_pairs(values)
    }
}

impl<T: QueryEncode + ?Sized> QueryEncode for Box<T> {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        (**self).append_pairs(values)
    }
}

impl<T: QueryEncode + ?Sized> QueryEncode for Arc<T> {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        (**self).append_pairs(values)
    }
}

impl<T: QueryEncode + ?Sized> QueryEncode for Rc<T> {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        (**self).append_pairs(values)
    }
}

/// A serde-described record: a JSON object whose scalar members become pairs.
impl QueryEncode for serde_json::Value {
    fn append_pairs(&self, values: &mut QueryValues) -> Result<(), HttpError> {
        let serde_json::Value::Object(fields) = self else {
            return Err(HttpError::encoding(
                QUERY_CONTEXT,
                "can not parse query string: value is not a record",
            ));
        };
        for (key, field) in fields {
            match field {
                serde_json::Value::Null => values.add(key.as_str(), String::new()),
                serde_json::Value::String(s) => values.add(key.as_str(), s.as_str()),
                serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
                    values.add(key.as_str(), field.to_string());
                }
                serde_json::Value::Array(items) => {
                    for item in items {
                        values.add(key.as_str(), scalar_to_string(key, item)?);
                    }
                }
                serde_json::Value::Object(_) => field.append_pairs(values)?,
            }
        }
        Ok(())
    }
}

fn scalar_to_string(key: &str, value: &serde_json::Value) -> Result<String, HttpError> {
    match value {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => Ok(value.to_string()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(HttpError::encoding(
            QUERY_CONTEXT,
            format!("nested collection under key '{key}' is not a scalar"),
        )),
    }
}

/// Where a request's query parameters come from.
pub enum QuerySource {
    /// Pre-encoded key/value multimap
    Values(QueryValues),
    /// Annotated record (possibly nested via `squash`)
    Record(Box<dyn QueryEncode + Send + Sync>),
}

impl QuerySource {
    /// Wrap an annotated record.
    #[must_use]
    pub fn record<T>(record: T) -> Self
    where
        T: QueryEncode + Send + Sync + 'static,
    {
        Self::Record(Box::new(record))
    }

    /// Capture a serde-serializable record.
    ///
    /// The value is converted eagerly so later mutations of the caller's
    /// value do not leak into the request.
    ///
    /// # Errors
    /// Returns `HttpError::Encoding` if the value cannot be serialized.
    pub fn serialized<T: serde::Serialize + ?Sized>(record: &T) -> Result<Self, HttpError> {
        let value =
            serde_json::to_value(record).map_err(|e| HttpError::encoding(QUERY_CONTEXT, e))?;
        Ok(Self::Record(Box::new(value)))
    }

    /// Produce the canonical (key-sorted, percent-encoded) query string.
    ///
    /// # Errors
    /// Returns `HttpError::Encoding` if a record cannot be encoded.
    pub fn encode(&self) -> Result<String, HttpError> {
        match self {
            Self::Values(values) => values.encode(),
            Self::Record(record) => record.to_query_values()?.encode(),
        }
    }
}

impl From<QueryValues> for QuerySource {
    fn from(values: QueryValues) -> Self {
        Self::Values(values)
    }
}

impl std::fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Self::Record(_) => f.write_str("Record(..)"),
        }
    }
}
