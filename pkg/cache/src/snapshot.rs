use pkg_types::cluster_queue::NamespaceSelector;
use pkg_types::flavor::ResourceFlavor;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::cluster_queue::{ClusterQueue, ClusterQueueStatus, FlavorLimits, Resources};
use crate::cohort::Cohort;

/// Immutable, deep-copied view of the cache. Built under the read lock;
/// traversable without it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub cluster_queues: BTreeMap<String, ClusterQueueSnapshot>,
    pub cohorts: BTreeMap<String, CohortSnapshot>,
    pub flavors: BTreeMap<String, ResourceFlavor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterQueueSnapshot {
    pub name: String,
    /// None when the queue stands alone (an implicit cohort of one).
    pub cohort: Option<String>,
    pub namespace_selector: NamespaceSelector,
    pub requestable_resources: BTreeMap<String, Vec<FlavorLimits>>,
    pub used_resources: Resources,
    pub label_keys: BTreeMap<String, BTreeSet<String>>,
    pub workloads: BTreeSet<String>,
    pub assumed_workloads: BTreeSet<String>,
    pub status: ClusterQueueStatus,
}

/// A cohort with its membership and on-demand aggregates: summed declared
/// min and summed usage per (resource, flavor) across members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSnapshot {
    pub name: String,
    pub members: BTreeSet<String>,
    pub requestable: Resources,
    pub used: Resources,
}

impl ClusterQueueSnapshot {
    pub(crate) fn from_entry(cq: &ClusterQueue) -> Self {
        Self {
            name: cq.name.clone(),
            cohort: (!cq.cohort.is_empty()).then(|| cq.cohort.clone()),
            namespace_selector: cq.namespace_selector.clone(),
            requestable_resources: cq.requestable_resources.clone(),
            used_resources: cq.used_resources.clone(),
            label_keys: cq.label_keys.clone(),
            workloads: cq.workloads.keys().cloned().collect(),
            assumed_workloads: cq.assumed_workloads.clone(),
            status: cq.status,
        }
    }
}

impl CohortSnapshot {
    pub(crate) fn from_members<'a>(
        cohort: &Cohort,
        entries: impl Iterator<Item = &'a ClusterQueue>,
    ) -> Self {
        let mut requestable: Resources = BTreeMap::new();
        let mut used: Resources = BTreeMap::new();
        for cq in entries {
            for (resource, limits) in &cq.requestable_resources {
                let per_flavor = requestable.entry(resource.clone()).or_default();
                for limit in limits {
                    let total = per_flavor.entry(limit.name.clone()).or_insert(0);
                    *total = total.saturating_add(limit.min);
                }
            }
            for (resource, per_flavor) in &cq.used_resources {
                let out = used.entry(resource.clone()).or_default();
                for (flavor, amount) in per_flavor {
                    let total = out.entry(flavor.clone()).or_insert(0);
                    *total = total.saturating_add(*amount);
                }
            }
        }
        Self {
            name: cohort.name.clone(),
            members: cohort.members().clone(),
            requestable,
            used,
        }
    }
}
