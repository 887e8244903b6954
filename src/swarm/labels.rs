//! Node label sets

use super::node::{NAME_LABEL, TYPE_LABEL};
use crate::error::{Result, SerpensError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label mapping applied to a node in one update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabels {
    labels: BTreeMap<String, String>,
}

impl NodeLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `type` + `name` pair every node is expected to carry
    pub fn role(class: &str, name: &str) -> Self {
        Self::new().with_class(class).with_name(name)
    }

    /// Set the `type` label
    pub fn with_class(mut self, class: &str) -> Self {
        self.labels.insert(TYPE_LABEL.to_string(), class.to_string());
        self
    }

    /// Set the `name` label
    pub fn with_name(mut self, name: &str) -> Self {
        self.labels.insert(NAME_LABEL.to_string(), name.to_string());
        self
    }

    /// Set an arbitrary label; later values win
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Parse a `key=value` argument; `key` alone means an empty value
    pub fn insert_pair(&mut self, pair: &str) -> Result<()> {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = key.trim();
        if key.is_empty() {
            return Err(SerpensError::LabelRejected(format!(
                "invalid label '{}': key is empty",
                pair
            )));
        }
        self.insert(key, value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Reject label sets no orchestration layer would accept
    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(SerpensError::LabelRejected(
                "at least one label is required".to_string(),
            ));
        }
        if self.labels.keys().any(|k| k.trim().is_empty()) {
            return Err(SerpensError::LabelRejected("label key is empty".to_string()));
        }
        Ok(())
    }
}

impl From<BTreeMap<String, String>> for NodeLabels {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NodeLabels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            labels: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels() {
        let labels = NodeLabels::role("manager", "rpi4");
        assert_eq!(labels.get("type"), Some("manager"));
        assert_eq!(labels.get("name"), Some("rpi4"));
        assert_eq!(labels.len(), 2);
        assert!(labels.validate().is_ok());
    }

    #[test]
    fn test_insert_pair() {
        let mut labels = NodeLabels::new();
        labels.insert_pair("zone=garage").unwrap();
        labels.insert_pair("gpu").unwrap();
        labels.insert_pair("zone=attic").unwrap();

        assert_eq!(labels.get("zone"), Some("attic"));
        assert_eq!(labels.get("gpu"), Some(""));

        let err = labels.insert_pair("=oops").unwrap_err();
        assert!(matches!(err, SerpensError::LabelRejected(_)));
    }

    #[test]
    fn test_validate_empty() {
        let err = NodeLabels::new().validate().unwrap_err();
        assert!(matches!(err, SerpensError::LabelRejected(_)));

        let labels: NodeLabels = [(" ", "x")].into_iter().collect();
        assert!(labels.validate().is_err());
    }
}
