use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named class of capacity for a resource (e.g. "on-demand" vs "spot"),
/// identified by the label key/values carried by matching nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFlavor {
    pub name: String,
    /// Node labels selecting this flavor. Cluster-queues referencing the
    /// flavor import the key-set.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ResourceFlavor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}
