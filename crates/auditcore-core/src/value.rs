// Tagged value tree for event fields
//
// Field values are a closed variant set: string, number, bool, timestamp,
// nested mapping, ordered sequence, null. The sanitizer and schema
// validator traverse this tree; serialization is defined per variant.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Mapping from field name to value, as carried by an event.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Sequence(Vec<FieldValue>),
    Mapping(FieldMap),
}

impl FieldValue {
    /// Variant name used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Number(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Sequence(_) => "sequence",
            FieldValue::Mapping(_) => "mapping",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert an arbitrary JSON value into a field tree.
    ///
    /// Subtrees deeper than `max_depth` are replaced with `sentinel`, the
    /// same replacement the sanitizer uses when its own depth guard trips.
    pub fn from_json(value: &serde_json::Value, max_depth: usize, sentinel: &str) -> FieldValue {
        fn convert(value: &serde_json::Value, depth: usize, limit: usize, sentinel: &str) -> FieldValue {
            if depth > limit {
                return FieldValue::String(sentinel.to_string());
            }
            match value {
                serde_json::Value::Null => FieldValue::Null,
                serde_json::Value::Bool(b) => FieldValue::Bool(*b),
                serde_json::Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
                serde_json::Value::String(s) => FieldValue::String(s.clone()),
                serde_json::Value::Array(items) => FieldValue::Sequence(
                    items
                        .iter()
                        .map(|v| convert(v, depth + 1, limit, sentinel))
                        .collect(),
                ),
                serde_json::Value::Object(entries) => FieldValue::Mapping(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), convert(v, depth + 1, limit, sentinel)))
                        .collect(),
                ),
            }
        }
        convert(value, 0, max_depth, sentinel)
    }

    /// Approximate in-memory size, used for buffer byte accounting.
    pub fn approx_bytes(&self) -> usize {
        match self {
            FieldValue::Null => 8,
            FieldValue::Bool(_) => 8,
            FieldValue::Number(_) => 8,
            FieldValue::String(s) => 24 + s.len(),
            FieldValue::Timestamp(_) => 12,
            FieldValue::Sequence(items) => {
                24 + items.iter().map(FieldValue::approx_bytes).sum::<usize>()
            }
            FieldValue::Mapping(entries) => {
                24 + entries
                    .iter()
                    .map(|(k, v)| 24 + k.len() + v.approx_bytes())
                    .sum::<usize>()
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(f64::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => FieldValue::Null,
        }
    }
}

/// Build a [`FieldMap`] from `key => value` pairs.
///
/// ```
/// use auditcore_core::fields;
/// let f = fields! { "user" => "alice", "attempts" => 3 };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::FieldMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::FieldMap::new();
        $(map.insert($key.to_string(), $crate::FieldValue::from($value));)+
        map
    }};
}
