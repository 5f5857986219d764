use pkg_metrics::CacheMetrics;
use pkg_types::cluster_queue::{ClusterQueueSpec, NamespaceSelector, ResourceQuota};
use pkg_types::flavor::ResourceFlavor;
use pkg_types::quantity::{QuantityError, ScalingPolicy};
use pkg_types::workload::Workload;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::error::CacheError;

/// Normalised quota for one flavor: fixed-point min and optional max.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorLimits {
    pub name: String,
    pub min: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// resource name → flavor name → fixed-point total.
pub type Resources = BTreeMap<String, BTreeMap<String, i64>>;

/// Whether every flavor the queue references is known to the registry.
/// Advisory to the scheduler; mutations proceed regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClusterQueueStatus {
    Pending,
    Active,
}

impl fmt::Display for ClusterQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterQueueStatus::Pending => write!(f, "Pending"),
            ClusterQueueStatus::Active => write!(f, "Active"),
        }
    }
}

/// One (resource, flavor, amount) usage contribution from a pod-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub resource: String,
    pub flavor: String,
    pub amount: i64,
}

/// An admitted workload plus its charges, fixed at admission time so that
/// removal refunds exactly what was added regardless of later edits.
#[derive(Debug, Clone)]
pub struct WorkloadInfo {
    pub workload: Workload,
    pub charges: Vec<Charge>,
}

impl WorkloadInfo {
    /// Derive charges from the workload's pod-sets and admission record.
    /// A pod-set request with no admitted flavor for its resource cannot be
    /// attributed and contributes nothing.
    pub fn new(workload: Workload, policy: &ScalingPolicy) -> Result<Self, CacheError> {
        let mut charges = Vec::new();
        if let Some(admission) = &workload.admission {
            for ps in &workload.pod_sets {
                for (resource, raw) in &ps.requests {
                    let Some(flavor) = admission.flavor_for(&ps.name, resource) else {
                        continue;
                    };
                    let unit = policy.normalize(resource, raw)?;
                    let amount = unit.checked_mul(i64::from(ps.count)).ok_or_else(|| {
                        CacheError::InvalidQuantity(QuantityError::Overflow { raw: raw.clone() })
                    })?;
                    charges.push(Charge {
                        resource: resource.clone(),
                        flavor: flavor.to_string(),
                        amount,
                    });
                }
            }
        }
        Ok(Self { workload, charges })
    }

    pub fn key(&self) -> String {
        self.workload.key()
    }
}

/// Point-in-time usage of one flavor. `borrowed` is how far the total
/// exceeds the queue's own declared min, present only for flavors in the
/// quota and only when positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorUsage {
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borrowed: Option<i64>,
}

/// Per-pool cache entry: the normalised quota, its shape-mirrored usage
/// table, the admitted and assumed workload sets, and derived readiness.
#[derive(Debug, Clone)]
pub struct ClusterQueue {
    pub name: String,
    pub cohort: String,
    pub namespace_selector: NamespaceSelector,
    /// Flavor order within each resource is declaration order; borrowing
    /// starts from the first flavor with capacity.
    pub requestable_resources: BTreeMap<String, Vec<FlavorLimits>>,
    pub used_resources: Resources,
    pub workloads: BTreeMap<String, WorkloadInfo>,
    pub assumed_workloads: BTreeSet<String>,
    /// resource → union of label keys across its known referenced flavors.
    /// No entry when none of the referenced flavors carries labels.
    pub label_keys: BTreeMap<String, BTreeSet<String>>,
    pub status: ClusterQueueStatus,
}

impl ClusterQueue {
    pub fn new(
        spec: &ClusterQueueSpec,
        policy: &ScalingPolicy,
        flavors: &BTreeMap<String, ResourceFlavor>,
    ) -> Result<Self, CacheError> {
        let mut cq = Self {
            name: spec.name.clone(),
            cohort: spec.cohort.clone(),
            namespace_selector: spec.namespace_selector.clone(),
            requestable_resources: BTreeMap::new(),
            used_resources: BTreeMap::new(),
            workloads: BTreeMap::new(),
            assumed_workloads: BTreeSet::new(),
            label_keys: BTreeMap::new(),
            status: ClusterQueueStatus::Pending,
        };
        cq.update_quota(&spec.resources, policy)?;
        cq.refresh_derived(flavors);
        Ok(cq)
    }

    /// Replace the quota tables. The used table is rebuilt to mirror the
    /// new shape: counts for surviving (resource, flavor) pairs carry over,
    /// new pairs start at zero, and counts for dropped pairs are discarded.
    /// Nothing is mutated when a quantity fails to normalise.
    pub fn update_quota(
        &mut self,
        resources: &[ResourceQuota],
        policy: &ScalingPolicy,
    ) -> Result<(), CacheError> {
        let mut requestable: BTreeMap<String, Vec<FlavorLimits>> = BTreeMap::new();
        for resource in resources {
            let mut limits = Vec::with_capacity(resource.flavors.len());
            for flavor in &resource.flavors {
                let min = policy.normalize(&resource.name, &flavor.min)?;
                let max = flavor
                    .max
                    .as_deref()
                    .map(|raw| policy.normalize(&resource.name, raw))
                    .transpose()?;
                limits.push(FlavorLimits {
                    name: flavor.name.clone(),
                    min,
                    max,
                });
            }
            requestable.insert(resource.name.clone(), limits);
        }

        let mut used: Resources = BTreeMap::new();
        for (resource, limits) in &requestable {
            let old = self.used_resources.get(resource);
            let mut per_flavor = BTreeMap::new();
            for limit in limits {
                let carried = old.and_then(|m| m.get(&limit.name)).copied().unwrap_or(0);
                per_flavor.insert(limit.name.clone(), carried);
            }
            used.insert(resource.clone(), per_flavor);
        }

        self.requestable_resources = requestable;
        self.used_resources = used;
        Ok(())
    }

    /// Recompute `label_keys` and `status` from the current flavor
    /// registry: Active iff every referenced flavor is known.
    pub fn refresh_derived(&mut self, flavors: &BTreeMap<String, ResourceFlavor>) {
        let mut label_keys = BTreeMap::new();
        let mut all_known = true;
        for (resource, limits) in &self.requestable_resources {
            let mut keys = BTreeSet::new();
            for limit in limits {
                match flavors.get(&limit.name) {
                    Some(flavor) => keys.extend(flavor.labels.keys().cloned()),
                    None => all_known = false,
                }
            }
            if !keys.is_empty() {
                label_keys.insert(resource.clone(), keys);
            }
        }
        self.label_keys = label_keys;
        self.status = if all_known {
            ClusterQueueStatus::Active
        } else {
            ClusterQueueStatus::Pending
        };
    }

    /// Names of every flavor referenced by the quota.
    pub fn referenced_flavors(&self) -> BTreeSet<String> {
        self.requestable_resources
            .values()
            .flatten()
            .map(|limit| limit.name.clone())
            .collect()
    }

    /// Admit a workload and charge its usage.
    pub fn add_workload(&mut self, info: WorkloadInfo) {
        self.add_usage(&info.charges);
        self.workloads.insert(info.key(), info);
    }

    /// Drop a workload if resident, refunding exactly its recorded charges
    /// and clearing its assumed flag. Returns whether it was resident.
    pub fn delete_workload(&mut self, key: &str, metrics: Option<&CacheMetrics>) -> bool {
        match self.workloads.remove(key) {
            Some(info) => {
                self.subtract_usage(&info.charges, metrics);
                self.assumed_workloads.remove(key);
                true
            }
            None => false,
        }
    }

    fn add_usage(&mut self, charges: &[Charge]) {
        for charge in charges {
            // A resource the quota does not track is not accounted.
            let Some(per_flavor) = self.used_resources.get_mut(&charge.resource) else {
                continue;
            };
            // The admitted flavor may be outside the current quota shape
            // (the quota shrank after admission); record it anyway so the
            // usage stays observable.
            let total = per_flavor.entry(charge.flavor.clone()).or_insert(0);
            *total = total.saturating_add(charge.amount);
        }
    }

    fn subtract_usage(&mut self, charges: &[Charge], metrics: Option<&CacheMetrics>) {
        for charge in charges {
            let Some(per_flavor) = self.used_resources.get_mut(&charge.resource) else {
                continue;
            };
            match per_flavor.get_mut(&charge.flavor) {
                Some(total) if *total >= charge.amount => *total -= charge.amount,
                Some(total) => {
                    warn!(
                        queue = %self.name,
                        resource = %charge.resource,
                        flavor = %charge.flavor,
                        have = *total,
                        refund = charge.amount,
                        "usage underflow, clamping to zero; caches are out of sync"
                    );
                    *total = 0;
                    if let Some(m) = metrics {
                        m.usage_underflow();
                    }
                }
                None => {
                    warn!(
                        queue = %self.name,
                        resource = %charge.resource,
                        flavor = %charge.flavor,
                        "refund for an untracked flavor; caches are out of sync"
                    );
                    if let Some(m) = metrics {
                        m.usage_underflow();
                    }
                }
            }
        }
    }

    /// Self-contained usage report: totals per (resource, flavor), with
    /// the borrow above the declared min where the flavor is in the quota.
    pub fn usage_report(&self) -> BTreeMap<String, BTreeMap<String, FlavorUsage>> {
        let mut report = BTreeMap::new();
        for (resource, per_flavor) in &self.used_resources {
            let limits = self.requestable_resources.get(resource);
            let mut out = BTreeMap::new();
            for (flavor, total) in per_flavor {
                let min = limits
                    .and_then(|ls| ls.iter().find(|l| &l.name == flavor))
                    .map(|l| l.min);
                let borrowed = min.map(|m| (*total - m).max(0)).filter(|b| *b > 0);
                out.insert(
                    flavor.clone(),
                    FlavorUsage {
                        total: *total,
                        borrowed,
                    },
                );
            }
            report.insert(resource.clone(), out);
        }
        report
    }
}
