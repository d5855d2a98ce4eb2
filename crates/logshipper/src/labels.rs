// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream identity for log entries.
//!
//! A [`LabelSet`] is an ordered, deduplicated set of name/value pairs. Two
//! entries belong to the same stream exactly when their label sets are equal,
//! so the set doubles as the batch key via [`LabelSet::id`].

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A label set with no pairs. Entries carrying it only pick up the process-wide
/// external labels.
pub const EMPTY_LABELS: LabelSet = LabelSet { pairs: Vec::new() };

/// Ordered, deduplicated `(name, value)` pairs identifying a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    // Sorted by name; at most one value per name.
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = Self::new();
        for (name, value) in pairs {
            labels.insert(name.into(), value.into());
        }
        labels
    }

    /// Parses `key:value` pairs from an environment string. Space-separated
    /// pairs are the standard; comma-separated pairs are also accepted for
    /// compatibility. Malformed fragments are skipped.
    pub fn from_env_string(raw: &str) -> Self {
        let normalized = raw.replace(',', " ");

        let mut labels = Self::new();
        for kv in normalized.split_whitespace() {
            let parts = kv.split(':').collect::<Vec<&str>>();
            if parts.len() == 2 && !parts[0].is_empty() {
                labels.insert(parts[0].to_string(), parts[1].to_string());
            }
        }
        labels
    }

    /// Inserts a pair, replacing any existing value for the same name.
    pub fn insert(&mut self, name: String, value: String) {
        match self.pairs.binary_search_by(|(n, _)| n.as_str().cmp(&name)) {
            Ok(idx) => self.pairs[idx].1 = value,
            Err(idx) => self.pairs.insert(idx, (name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|idx| self.pairs[idx].1.as_str())
    }

    /// Returns a new set with `defaults` folded in. Pairs already present in
    /// `self` win over the defaults.
    pub fn merge(&self, defaults: &LabelSet) -> LabelSet {
        let mut merged = defaults.clone();
        for (name, value) in &self.pairs {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Stream key: an fnv hash over the sorted pairs. Stable across insertion
    /// order because the pairs are kept sorted.
    pub fn id(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        for (name, value) in &self.pairs {
            hasher.write(name.as_bytes());
            hasher.write_u8(0xfe);
            hasher.write(value.as_bytes());
            hasher.write_u8(0xfe);
        }
        hasher.finish()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}=\"{value}\"")?;
        }
        write!(f, "}}")
    }
}

impl Serialize for LabelSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.pairs.len()))?;
        for (name, value) in &self.pairs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_string() {
        let labels = LabelSet::from_env_string("job:varlog,host:web-1");
        assert_eq!(labels.get("job"), Some("varlog"));
        assert_eq!(labels.get("host"), Some("web-1"));

        // Space-separated works too, malformed fragments are skipped
        let labels = LabelSet::from_env_string("job:varlog bogus host:web-1 :nope");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("bogus"), None);
    }

    #[test]
    fn test_insert_replaces() {
        let mut labels = LabelSet::from_pairs([("job", "a")]);
        labels.insert("job".to_string(), "b".to_string());
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("job"), Some("b"));
    }

    #[test]
    fn test_id_is_order_independent() {
        let a = LabelSet::from_pairs([("job", "varlog"), ("host", "web-1")]);
        let b = LabelSet::from_pairs([("host", "web-1"), ("job", "varlog")]);
        assert_eq!(a.id(), b.id());

        let c = LabelSet::from_pairs([("host", "web-2"), ("job", "varlog")]);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_merge_prefers_own_pairs() {
        let external = LabelSet::from_pairs([("env", "prod"), ("host", "web-1")]);
        let stream = LabelSet::from_pairs([("job", "varlog"), ("host", "override")]);

        let merged = stream.merge(&external);
        assert_eq!(merged.get("env"), Some("prod"));
        assert_eq!(merged.get("job"), Some("varlog"));
        assert_eq!(merged.get("host"), Some("override"));
    }

    #[test]
    fn test_display_and_serialize() {
        let labels = LabelSet::from_pairs([("job", "varlog"), ("host", "web-1")]);
        assert_eq!(labels.to_string(), "{host=\"web-1\", job=\"varlog\"}");

        let json = serde_json::to_value(&labels).expect("serialize failed");
        assert_eq!(json, serde_json::json!({"host": "web-1", "job": "varlog"}));
    }
}
