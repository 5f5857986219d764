use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared quota for one flavor of a resource. Quantities are in the
/// orchestrator's human-readable form; the cache normalises them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorQuota {
    pub name: String,
    pub min: String,
    #[serde(default)]
    pub max: Option<String>,
}

/// Quota declaration for one resource name. Flavor order is declaration
/// order and is load-bearing: borrowing starts from the first flavor with
/// capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub name: String,
    #[serde(default)]
    pub flavors: Vec<FlavorQuota>,
}

/// Predicate over namespace labels deciding which namespaces may submit to
/// a cluster-queue. `Nothing` is the default when no selector is declared;
/// an explicitly empty selector means `Everything`. The two are distinct so
/// callers can tell "deny all" from "not configured".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceSelector {
    #[default]
    Nothing,
    Everything,
    MatchLabels(BTreeMap<String, String>),
}

impl NamespaceSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            NamespaceSelector::Nothing => false,
            NamespaceSelector::Everything => true,
            NamespaceSelector::MatchLabels(required) => required
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|have| have == v)),
        }
    }
}

/// Declared shape of a quota pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterQueueSpec {
    pub name: String,
    /// Name of the cohort this queue may borrow within. Empty means the
    /// queue stands alone.
    #[serde(default)]
    pub cohort: String,
    #[serde(default)]
    pub namespace_selector: NamespaceSelector,
    #[serde(default)]
    pub resources: Vec<ResourceQuota>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn nothing_matches_no_namespace() {
        let sel = NamespaceSelector::default();
        assert!(!sel.matches(&BTreeMap::new()));
        assert!(!sel.matches(&labels(&[("team", "a")])));
    }

    #[test]
    fn everything_matches_all_namespaces() {
        let sel = NamespaceSelector::Everything;
        assert!(sel.matches(&BTreeMap::new()));
        assert!(sel.matches(&labels(&[("team", "a")])));
    }

    #[test]
    fn spec_round_trips_through_json() {
        let spec = ClusterQueueSpec {
            name: "pool".to_string(),
            cohort: "shared".to_string(),
            namespace_selector: NamespaceSelector::MatchLabels(labels(&[("team", "a")])),
            resources: vec![ResourceQuota {
                name: "cpu".to_string(),
                flavors: vec![FlavorQuota {
                    name: "on-demand".to_string(),
                    min: "10".to_string(),
                    max: Some("20".to_string()),
                }],
            }],
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: ClusterQueueSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn omitted_selector_defaults_to_nothing() {
        let spec: ClusterQueueSpec = serde_json::from_str(
            r#"{"name":"pool","created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(spec.namespace_selector, NamespaceSelector::Nothing);
        assert!(spec.cohort.is_empty());
        assert!(spec.resources.is_empty());
    }

    #[test]
    fn match_labels_requires_every_pair() {
        let sel = NamespaceSelector::MatchLabels(labels(&[("team", "a"), ("env", "prod")]));
        assert!(sel.matches(&labels(&[("team", "a"), ("env", "prod"), ("x", "y")])));
        assert!(!sel.matches(&labels(&[("team", "a")])));
        assert!(!sel.matches(&labels(&[("team", "b"), ("env", "prod")])));
    }
}
