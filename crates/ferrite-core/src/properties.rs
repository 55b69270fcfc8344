//! Case-insensitive service/configuration property map.
//!
//! Keys compare case-insensitively (matching the LDAP filter engine's
//! attribute-name semantics) but the original casing of the first
//! insertion is preserved for iteration and serialization. Constructing a
//! map from a list of key/value pairs that collide case-insensitively is
//! rejected rather than silently keeping the last write.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// An immutable, case-insensitively-keyed map of property values.
///
/// Used both for service properties (`objectClass`, `service.id`,
/// `service.ranking`, ...) and configuration-record dictionaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

fn fold(key: &str) -> String {
    key.to_ascii_lowercase()
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs, preserving insertion order and
    /// original casing. Fails with [`CoreError::InvalidArgument`] if two
    /// keys collide under case-insensitive comparison.
    pub fn from_pairs<I>(pairs: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut entries = Vec::new();
        let mut index = HashMap::new();
        for (key, value) in pairs {
            let folded = fold(&key);
            if index.contains_key(&folded) {
                return Err(CoreError::invalid_argument(format!(
                    "duplicate property key: {key}"
                )));
            }
            index.insert(folded, entries.len());
            entries.push((key, value));
        }
        Ok(Properties { entries, index })
    }

    /// Looks up a value by key, case-insensitively.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(&fold(key)).map(|&i| &self.entries[i].1)
    }

    /// Looks up a value requiring an exact-case key match.
    pub fn get_case_sensitive(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(&fold(key))
    }

    /// Keys in original insertion casing and order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a new map with `key` set to `value`, replacing any existing
    /// case-insensitive match (keeping that entry's original casing) or
    /// appending a new entry.
    pub fn with(&self, key: &str, value: Value) -> Self {
        let folded = fold(key);
        let mut entries = self.entries.clone();
        if let Some(&i) = self.index.get(&folded) {
            entries[i].1 = value;
        } else {
            entries.push((key.to_string(), value));
        }
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (fold(k), i))
            .collect();
        Properties { entries, index }
    }

    /// Returns a new map with `key` removed, if present.
    pub fn without(&self, key: &str) -> Self {
        let folded = fold(key);
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|(k, _)| fold(k) != folded)
            .cloned()
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (fold(k), i))
            .collect();
        Properties { entries, index }
    }
}

impl From<Properties> for serde_json::Map<String, Value> {
    fn from(props: Properties) -> Self {
        props.entries.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_case_insensitive_duplicates() {
        let result = Properties::from_pairs([
            ("service.id".to_string(), json!(1)),
            ("Service.ID".to_string(), json!(2)),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn lookup_is_case_insensitive_but_preserves_casing() {
        let props = Properties::from_pairs([("Service.Ranking".to_string(), json!(5))]).unwrap();
        assert_eq!(props.get("service.ranking"), Some(&json!(5)));
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["Service.Ranking"]);
    }

    #[test]
    fn with_replaces_preserving_original_casing() {
        let props = Properties::from_pairs([("Foo".to_string(), json!(1))]).unwrap();
        let updated = props.with("foo", json!(2));
        assert_eq!(updated.get("FOO"), Some(&json!(2)));
        assert_eq!(updated.keys().collect::<Vec<_>>(), vec!["Foo"]);
    }
}
