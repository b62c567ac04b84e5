//! Property storage for message instances
//!
//! Keys are canonicalized to the declared property names at construction, so
//! lookups never need to consider aliases or alternate spellings.

use serde_json::{Map, Value};

/// Canonical property map for one message instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Map<String, Value>);

impl Properties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Looks up a property by its canonical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Stores a value under its canonical name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Whether a property currently holds a value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of stored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no properties are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrows the underlying map, e.g. for wire encoding.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes into the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let mut props = Properties::new();
        assert!(props.is_empty());

        props.insert("severity", json!("warn"));
        assert_eq!(props.get("severity"), Some(&json!("warn")));
        assert!(props.contains("severity"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn collects_from_pairs() {
        let props: Properties = vec![
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("b"), Some(&json!(2)));
    }
}
