//! Dynamically-shaped document metadata
//!
//! Documents carry an arbitrarily nested metadata record. It is modelled as a
//! recursive tagged value with a single path-walk routine shared by the
//! predicate evaluator and the template filter.

mod dates;

pub use dates::{parse_temporal, start_of_day, today};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<MetadataValue>),
    Mapping(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Build a mapping from `(key, value)` pairs
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, MetadataValue)>,
    {
        MetadataValue::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a direct child of a mapping
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        match self {
            MetadataValue::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow `path` through nested mappings.
    ///
    /// Returns `None` as soon as a key is absent or a non-mapping value is
    /// reached before the path is exhausted. An empty path yields `self`.
    pub fn walk<'p, I>(&self, path: I) -> Option<&MetadataValue>
    where
        I: IntoIterator<Item = &'p str>,
    {
        let mut current = self;
        for key in path {
            current = current.get(key)?;
        }
        Some(current)
    }

    /// Split a singleton nested mapping such as `{"a": {"b": 3}}` into its
    /// key path (`["a", "b"]`) and terminal operand (`3`).
    ///
    /// Mappings with zero or several keys at any level are malformed.
    pub fn singleton_path(&self) -> Option<(Vec<&str>, &MetadataValue)> {
        let mut path = Vec::new();
        let mut current = self;
        while let MetadataValue::Mapping(map) = current {
            if map.len() != 1 {
                return None;
            }
            let (key, value) = map.iter().next()?;
            path.push(key.as_str());
            current = value;
        }
        if path.is_empty() {
            None
        } else {
            Some((path, current))
        }
    }

    /// True for absent-like records: null or an empty mapping
    pub fn is_blank(&self) -> bool {
        match self {
            MetadataValue::Null => true,
            MetadataValue::Mapping(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, MetadataValue::Integer(_) | MetadataValue::Float(_))
    }

    pub fn as_sequence(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            MetadataValue::Mapping(map) => Some(map),
            _ => None,
        }
    }
}

impl Default for MetadataValue {
    fn default() -> Self {
        MetadataValue::Null
    }
}

impl From<serde_json::Value> for MetadataValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => MetadataValue::Null,
            Value::Bool(b) => MetadataValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => MetadataValue::Integer(i),
                None => MetadataValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => MetadataValue::Text(s),
            Value::Array(items) => {
                MetadataValue::Sequence(items.into_iter().map(MetadataValue::from).collect())
            }
            Value::Object(map) => MetadataValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, MetadataValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(values: Vec<T>) -> Self {
        MetadataValue::Sequence(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MetadataValue {
        MetadataValue::from(json!({
            "type": "event",
            "date": {"begin": "2024-05-01", "end": "2024-05-03"},
            "deep": {"labels": {"1": ["X", "Y"]}},
            "score": 4.5
        }))
    }

    #[test]
    fn test_walk_nested() {
        let meta = sample();
        assert_eq!(
            meta.walk(["date", "end"]),
            Some(&MetadataValue::from("2024-05-03"))
        );
        assert_eq!(
            meta.walk(["deep", "labels", "1"]),
            Some(&MetadataValue::from(vec!["X", "Y"]))
        );
    }

    #[test]
    fn test_walk_missing_or_through_scalar() {
        let meta = sample();
        assert!(meta.walk(["date", "middle"]).is_none());
        assert!(meta.walk(["type", "inner"]).is_none());
        assert!(meta.walk(["nope"]).is_none());
    }

    #[test]
    fn test_singleton_path() {
        let field = MetadataValue::from(json!({"deep": {"labels": {"1": "X"}}}));
        let (path, operand) = field.singleton_path().unwrap();
        assert_eq!(path, vec!["deep", "labels", "1"]);
        assert_eq!(operand, &MetadataValue::from("X"));
    }

    #[test]
    fn test_singleton_path_rejects_branching() {
        let field = MetadataValue::from(json!({"a": 1, "b": 2}));
        assert!(field.singleton_path().is_none());

        let scalar = MetadataValue::from("plain");
        assert!(scalar.singleton_path().is_none());
    }

    #[test]
    fn test_deserialize_untagged() {
        let value: MetadataValue =
            serde_json::from_str(r#"{"n": 3, "f": 1.5, "s": "x", "l": [true, null]}"#).unwrap();
        assert_eq!(value.get("n"), Some(&MetadataValue::Integer(3)));
        assert_eq!(value.get("f"), Some(&MetadataValue::Float(1.5)));
        assert_eq!(
            value.get("l"),
            Some(&MetadataValue::Sequence(vec![
                MetadataValue::Bool(true),
                MetadataValue::Null
            ]))
        );
    }

    #[test]
    fn test_blank_records() {
        assert!(MetadataValue::Null.is_blank());
        assert!(MetadataValue::from(json!({})).is_blank());
        assert!(!sample().is_blank());
    }
}
