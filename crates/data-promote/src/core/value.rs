//! Portable value types for store-agnostic data packaging.
//!
//! Rows and documents are captured as explicit field-name/value records
//! rather than reflective bindings, so a package can be serialized, moved
//! between environments, and replayed without knowing the source schema
//! at compile time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single field value inside a row or document.
///
/// Covers the scalar types both store kinds share, plus arrays and nested
/// documents for the document side. Values are fully owned so packages can
/// outlive their source connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit NULL / missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer (covers int, bigint, smallint).
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// Text/string data.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// UUID/GUID value.
    Uuid(Uuid),
    /// Decimal value with arbitrary precision.
    Decimal(Decimal),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Array of values (document stores).
    Array(Vec<FieldValue>),
    /// Nested sub-document (document stores).
    Document(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Render the value as a portable string, used when normalizing
    /// document ids at packaging time.
    #[must_use]
    pub fn to_portable_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Text(v) => v.clone(),
            FieldValue::Bytes(v) => hex::encode(v),
            FieldValue::Uuid(v) => v.to_string(),
            FieldValue::Decimal(v) => v.to_string(),
            FieldValue::DateTime(v) => v.to_rfc3339(),
            FieldValue::Array(_) | FieldValue::Document(_) => String::new(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_portable_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// An explicit field-name/value container representing one row or document.
///
/// Field order is stable (sorted by name) so serialized packages and
/// checksums are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record(pub BTreeMap<String, FieldValue>);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Set a field value, returning the previous value if any.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(name.into(), value)
    }

    /// Remove a field, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    /// Check whether the record has a non-null value for a field.
    pub fn has_value(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    /// Field names in the record.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A primary key or document id value.
///
/// Keys are kept separate from [`FieldValue`] because deployment tracks
/// old-key/new-key pairs per row, and a composite relational key needs its
/// own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    /// Integer key (auto-increment and sequence keys).
    Int(i64),
    /// UUID/GUID key.
    Uuid(Uuid),
    /// String key (includes portable document ids).
    Text(String),
    /// Composite key: column name to value.
    Composite(BTreeMap<String, FieldValue>),
}

impl KeyValue {
    /// Build a key from a single field value, if the value is a usable
    /// key type.
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(KeyValue::Int(*v)),
            FieldValue::Uuid(v) => Some(KeyValue::Uuid(*v)),
            FieldValue::Text(v) => Some(KeyValue::Text(v.clone())),
            _ => None,
        }
    }

    /// Extract a key from a record given the key column names.
    ///
    /// A single column yields a scalar key; multiple columns yield a
    /// composite key. Returns `None` when any key field is absent or, for
    /// the single-column case, not a usable key type.
    pub fn from_record(record: &Record, key_columns: &[String]) -> Option<Self> {
        match key_columns {
            [] => None,
            [column] => record.get(column).and_then(Self::from_field),
            columns => {
                let mut fields = BTreeMap::new();
                for column in columns {
                    fields.insert(column.clone(), record.get(column)?.clone());
                }
                Some(KeyValue::Composite(fields))
            }
        }
    }

    /// Convert a scalar key back into a field value.
    ///
    /// Composite keys have no single-field representation and return `None`.
    pub fn to_field(&self) -> Option<FieldValue> {
        match self {
            KeyValue::Int(v) => Some(FieldValue::Int(*v)),
            KeyValue::Uuid(v) => Some(FieldValue::Uuid(*v)),
            KeyValue::Text(v) => Some(FieldValue::Text(v.clone())),
            KeyValue::Composite(_) => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Uuid(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{}", v),
            KeyValue::Composite(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.to_portable_string()))
                    .collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        KeyValue::Uuid(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}
