use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A homogeneous group of pods within a workload: `count` replicas, each
/// requesting `requests` per resource (human-readable quantities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSet {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

/// Record of a workload being bound to a cluster-queue, with the flavor
/// chosen per (pod-set, resource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub cluster_queue: String,
    /// pod-set name → resource name → flavor name.
    #[serde(default)]
    pub pod_set_flavors: BTreeMap<String, BTreeMap<String, String>>,
}

impl Admission {
    pub fn flavor_for(&self, pod_set: &str, resource: &str) -> Option<&str> {
        self.pod_set_flavors
            .get(pod_set)
            .and_then(|flavors| flavors.get(resource))
            .map(String::as_str)
    }
}

/// A user-submitted unit of batch work. Opaque to the cache except for its
/// key, pod-sets, and admission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    /// The namespaced queue the user submitted to.
    #[serde(default)]
    pub queue_name: String,
    #[serde(default)]
    pub pod_sets: Vec<PodSet>,
    #[serde(default)]
    pub admission: Option<Admission>,
    pub created_at: DateTime<Utc>,
}

impl Workload {
    /// Cache key: `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
