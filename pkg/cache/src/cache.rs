use pkg_metrics::CacheMetrics;
use pkg_types::cluster_queue::ClusterQueueSpec;
use pkg_types::flavor::ResourceFlavor;
use pkg_types::quantity::ScalingPolicy;
use pkg_types::workload::Workload;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::cluster_queue::{ClusterQueue, ClusterQueueStatus, FlavorUsage, WorkloadInfo};
use crate::cohort::Cohort;
use crate::error::CacheError;
use crate::lister::WorkloadLister;
use crate::snapshot::{ClusterQueueSnapshot, CohortSnapshot, Snapshot};

/// Cohort-wide totals for one (resource, flavor), computed on demand from
/// current membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CohortTotals {
    /// Sum of the declared min across members that quota the flavor.
    pub requestable_min: i64,
    /// Sum of the current usage across members.
    pub used: i64,
}

/// The cluster-queue cache: quota pools, the workloads charged against
/// them, and the assumed-workload index, kept consistent under one
/// reader-writer lock. The cache owns no threads and performs no I/O under
/// the lock; it is a passive structure driven by external controllers on
/// one side and schedulers on the other.
pub struct Cache {
    state: RwLock<CacheState>,
    policy: ScalingPolicy,
    lister: Arc<dyn WorkloadLister>,
    metrics: Option<Arc<CacheMetrics>>,
}

#[derive(Default)]
struct CacheState {
    flavors: BTreeMap<String, ResourceFlavor>,
    /// flavor name → names of cluster-queues referencing it. Tracks
    /// references to unknown flavors too, so a late-arriving flavor can
    /// activate its referrers.
    flavor_referrers: BTreeMap<String, BTreeSet<String>>,
    cluster_queues: BTreeMap<String, ClusterQueue>,
    cohorts: BTreeMap<String, Cohort>,
    /// workload key → owning cluster-queue, for workloads charged
    /// optimistically but not yet confirmed.
    assumed_workloads: BTreeMap<String, String>,
}

impl Cache {
    pub fn new(lister: Arc<dyn WorkloadLister>) -> Self {
        Self::with_policy(lister, ScalingPolicy::default())
    }

    pub fn with_policy(lister: Arc<dyn WorkloadLister>, policy: ScalingPolicy) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            policy,
            lister,
            metrics: None,
        }
    }

    /// Attach the optional metrics hook. Reporting never affects semantics.
    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // --- Flavor registry ---

    /// Insert or replace a flavor. Every cluster-queue referencing it
    /// recomputes its label keys and readiness.
    pub fn upsert_flavor(&self, flavor: ResourceFlavor) {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let name = flavor.name.clone();
        state.flavors.insert(name.clone(), flavor);
        state.refresh_referrers_of(&name);
        self.record_metrics(state);
    }

    /// Remove a flavor. Referencing cluster-queues drop its label-key
    /// contributions and fall back to Pending.
    pub fn delete_flavor(&self, name: &str) {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        state.flavors.remove(name);
        state.refresh_referrers_of(name);
        self.record_metrics(state);
    }

    // --- Cluster-queue lifecycle ---

    /// Register a quota pool. Admitted workloads already observed for it
    /// are re-attached through the lister, which is consulted before the
    /// write lock is taken.
    pub fn add_cluster_queue(&self, spec: &ClusterQueueSpec) -> Result<(), CacheError> {
        let known = self
            .lister
            .list_admitted(&spec.name)
            .map_err(|source| CacheError::ListWorkloads {
                cluster_queue: spec.name.clone(),
                source,
            })?;

        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        if state.cluster_queues.contains_key(&spec.name) {
            return Err(CacheError::AlreadyExists(spec.name.clone()));
        }
        let mut cq = ClusterQueue::new(spec, &self.policy, &state.flavors)?;

        for workload in known {
            let admitted_here = workload
                .admission
                .as_ref()
                .is_some_and(|a| a.cluster_queue == spec.name);
            if !admitted_here {
                continue;
            }
            let key = workload.key();
            if cq.workloads.contains_key(&key) {
                continue;
            }
            match WorkloadInfo::new(workload, &self.policy) {
                Ok(info) => cq.add_workload(info),
                // A single malformed workload must not block the queue.
                Err(err) => warn!(
                    workload = %key,
                    error = %err,
                    "skipping workload with unparseable requests"
                ),
            }
        }

        state.index_referrers(&spec.name, &cq.referenced_flavors());
        state.join_cohort(&spec.name, &spec.cohort);
        state.cluster_queues.insert(spec.name.clone(), cq);
        self.record_metrics(state);
        Ok(())
    }

    /// Update a pool in place: quota and selector replaced, usage carried
    /// over for surviving (resource, flavor) pairs, cohort moved if
    /// renamed. Fails without mutation on unknown name or bad quantities.
    pub fn update_cluster_queue(&self, spec: &ClusterQueueSpec) -> Result<(), CacheError> {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let Some(cq) = state.cluster_queues.get_mut(&spec.name) else {
            return Err(CacheError::ClusterQueueNotFound);
        };
        let old_refs = cq.referenced_flavors();
        let old_cohort = cq.cohort.clone();

        cq.update_quota(&spec.resources, &self.policy)?;
        cq.namespace_selector = spec.namespace_selector.clone();
        cq.cohort = spec.cohort.clone();
        cq.refresh_derived(&state.flavors);
        let new_refs = cq.referenced_flavors();

        state.unindex_referrers(&spec.name, &old_refs);
        state.index_referrers(&spec.name, &new_refs);
        if old_cohort != spec.cohort {
            state.leave_cohort(&spec.name, &old_cohort);
            state.join_cohort(&spec.name, &spec.cohort);
        }
        self.record_metrics(state);
        Ok(())
    }

    /// Remove a pool. Resident workloads become untracked; deleting a
    /// queue with live admissions is the caller's mistake, but the cache
    /// stays internally consistent.
    pub fn delete_cluster_queue(&self, name: &str) {
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let Some(cq) = state.cluster_queues.remove(name) else {
            return;
        };
        state.unindex_referrers(name, &cq.referenced_flavors());
        state.leave_cohort(name, &cq.cohort);
        for key in &cq.assumed_workloads {
            state.assumed_workloads.remove(key);
        }
        self.record_metrics(state);
    }

    // --- Workload lifecycle ---

    /// Record a confirmed admission. Returns false when the workload has
    /// no admission, its cluster-queue is unknown, or its requests fail to
    /// parse. Confirms a pending assume in place; a stale assume at a
    /// different queue is rolled back there first. Idempotent for a
    /// workload already admitted to the target.
    pub fn add_or_update_workload(&self, workload: &Workload) -> bool {
        let Some(admission) = &workload.admission else {
            return false;
        };
        let target = admission.cluster_queue.clone();
        let info = match WorkloadInfo::new(workload.clone(), &self.policy) {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    workload = %workload.key(),
                    error = %err,
                    "rejecting workload with unparseable requests"
                );
                return false;
            }
        };

        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        if !state.cluster_queues.contains_key(&target) {
            return false;
        }
        let key = workload.key();
        state.cleanup_assumed(workload, self.metrics.as_deref());
        let Some(cq) = state.cluster_queues.get_mut(&target) else {
            return false;
        };
        if !cq.workloads.contains_key(&key) {
            cq.add_workload(info);
        }
        self.record_metrics(state);
        true
    }

    /// Move a workload's charge from its old admission to its new one in
    /// one critical section. Both referenced queues are validated and the
    /// new charges parsed before anything is touched.
    pub fn update_workload(&self, old: &Workload, new: &Workload) -> Result<(), CacheError> {
        let new_target = new.admission.as_ref().map(|a| a.cluster_queue.clone());
        let new_info = new
            .admission
            .as_ref()
            .map(|_| WorkloadInfo::new(new.clone(), &self.policy))
            .transpose()?;

        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        if let Some(admission) = &old.admission {
            if !state.cluster_queues.contains_key(&admission.cluster_queue) {
                return Err(CacheError::OldClusterQueueMissing);
            }
        }
        if let Some(admission) = &new.admission {
            if !state.cluster_queues.contains_key(&admission.cluster_queue) {
                return Err(CacheError::NewClusterQueueMissing);
            }
        }

        if let Some(admission) = &old.admission {
            if let Some(cq) = state.cluster_queues.get_mut(&admission.cluster_queue) {
                cq.delete_workload(&old.key(), self.metrics.as_deref());
            }
        }
        state.cleanup_assumed(old, self.metrics.as_deref());

        if let (Some(info), Some(target)) = (new_info, &new_target) {
            if let Some(cq) = state.cluster_queues.get_mut(target) {
                if !cq.workloads.contains_key(&new.key()) {
                    cq.add_workload(info);
                }
            }
        }
        self.record_metrics(state);
        Ok(())
    }

    /// Drop a workload and refund its usage. The owner is resolved through
    /// the assumed index first, then the admission record. Dropping a
    /// workload the owner never saw is a no-op.
    pub fn delete_workload(&self, workload: &Workload) -> Result<(), CacheError> {
        let key = workload.key();
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let owner = state
            .assumed_workloads
            .get(&key)
            .cloned()
            .or_else(|| workload.admission.as_ref().map(|a| a.cluster_queue.clone()));
        let Some(owner) = owner else {
            return Err(CacheError::ClusterQueueNotFound);
        };
        let Some(cq) = state.cluster_queues.get_mut(&owner) else {
            return Err(CacheError::ClusterQueueNotFound);
        };
        cq.delete_workload(&key, self.metrics.as_deref());
        state.assumed_workloads.remove(&key);
        self.record_metrics(state);
        Ok(())
    }

    /// Provisionally charge a workload before the orchestrator confirms
    /// its admission, so concurrent scheduling decisions see the usage
    /// immediately. Confirmed later by `add_or_update_workload`, undone by
    /// `forget_workload`.
    pub fn assume_workload(&self, workload: &Workload) -> Result<(), CacheError> {
        let Some(admission) = &workload.admission else {
            return Err(CacheError::ClusterQueueNotFound);
        };
        let target = admission.cluster_queue.clone();
        let info = WorkloadInfo::new(workload.clone(), &self.policy)?;
        let key = workload.key();

        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        match state.cluster_queues.get(&target) {
            None => return Err(CacheError::ClusterQueueNotFound),
            Some(cq) if cq.workloads.contains_key(&key) => {
                return Err(CacheError::WorkloadAlreadyExists(target));
            }
            Some(_) => {}
        }
        state.cleanup_assumed(workload, self.metrics.as_deref());
        let Some(cq) = state.cluster_queues.get_mut(&target) else {
            return Err(CacheError::ClusterQueueNotFound);
        };
        cq.add_workload(info);
        cq.assumed_workloads.insert(key.clone());
        state.assumed_workloads.insert(key, target);
        self.record_metrics(state);
        Ok(())
    }

    /// Reverse an assume that was never confirmed.
    pub fn forget_workload(&self, workload: &Workload) -> Result<(), CacheError> {
        let key = workload.key();
        let mut guard = self.state.write().unwrap();
        let state = &mut *guard;
        let Some(owner) = state.assumed_workloads.remove(&key) else {
            return Err(CacheError::NotAssumed);
        };
        if let Some(cq) = state.cluster_queues.get_mut(&owner) {
            cq.delete_workload(&key, self.metrics.as_deref());
        }
        self.record_metrics(state);
        Ok(())
    }

    // --- Reader surface ---

    /// Current usage per (resource, flavor) and the admitted workload
    /// count. Self-contained; no aliasing with live state.
    pub fn usage(
        &self,
        cluster_queue: &str,
    ) -> Result<(BTreeMap<String, BTreeMap<String, FlavorUsage>>, usize), CacheError> {
        let state = self.state.read().unwrap();
        let cq = state
            .cluster_queues
            .get(cluster_queue)
            .ok_or(CacheError::ClusterQueueNotFound)?;
        Ok((cq.usage_report(), cq.workloads.len()))
    }

    /// Whether the queue exists and every flavor it references is known.
    pub fn cluster_queue_active(&self, cluster_queue: &str) -> bool {
        let state = self.state.read().unwrap();
        state
            .cluster_queues
            .get(cluster_queue)
            .is_some_and(|cq| cq.status == ClusterQueueStatus::Active)
    }

    /// Cohort-wide totals for one (resource, flavor). None when the cohort
    /// is unknown. Computed from current membership; nothing is cached, so
    /// the sums can never go stale.
    pub fn cohort_totals(&self, cohort: &str, resource: &str, flavor: &str) -> Option<CohortTotals> {
        let state = self.state.read().unwrap();
        let members = state.cohorts.get(cohort)?;
        let mut totals = CohortTotals::default();
        for name in members.members() {
            let Some(cq) = state.cluster_queues.get(name) else {
                continue;
            };
            if let Some(limit) = cq
                .requestable_resources
                .get(resource)
                .and_then(|limits| limits.iter().find(|l| l.name == flavor))
            {
                totals.requestable_min = totals.requestable_min.saturating_add(limit.min);
            }
            if let Some(used) = cq.used_resources.get(resource).and_then(|m| m.get(flavor)) {
                totals.used = totals.used.saturating_add(*used);
            }
        }
        Some(totals)
    }

    /// The global assumed index: workload key → owning cluster-queue.
    pub fn assumed_entries(&self) -> BTreeMap<String, String> {
        self.state.read().unwrap().assumed_workloads.clone()
    }

    /// Deep-copied view of the whole cache, grouped by cohort, for
    /// traversal without the lock. The only read path that allocates
    /// proportionally to cache size.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap();
        let cluster_queues = state
            .cluster_queues
            .values()
            .map(|cq| (cq.name.clone(), ClusterQueueSnapshot::from_entry(cq)))
            .collect();
        let cohorts = state
            .cohorts
            .values()
            .map(|cohort| {
                let members = cohort
                    .members()
                    .iter()
                    .filter_map(|name| state.cluster_queues.get(name));
                (
                    cohort.name.clone(),
                    CohortSnapshot::from_members(cohort, members),
                )
            })
            .collect();
        Snapshot {
            cluster_queues,
            cohorts,
            flavors: state.flavors.clone(),
        }
    }

    fn record_metrics(&self, state: &CacheState) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let admitted = state
            .cluster_queues
            .values()
            .map(|cq| cq.workloads.len())
            .sum();
        let pending = state
            .cluster_queues
            .values()
            .filter(|cq| cq.status == ClusterQueueStatus::Pending)
            .count();
        metrics.record_totals(
            admitted,
            state.assumed_workloads.len(),
            state.cluster_queues.len(),
            pending,
        );
    }
}

impl CacheState {
    fn join_cohort(&mut self, queue: &str, cohort: &str) {
        if cohort.is_empty() {
            return;
        }
        self.cohorts
            .entry(cohort.to_string())
            .or_insert_with(|| Cohort::new(cohort))
            .insert(queue);
    }

    fn leave_cohort(&mut self, queue: &str, cohort: &str) {
        if cohort.is_empty() {
            return;
        }
        if let Some(entry) = self.cohorts.get_mut(cohort) {
            entry.remove(queue);
            if entry.is_empty() {
                self.cohorts.remove(cohort);
            }
        }
    }

    fn index_referrers(&mut self, queue: &str, flavors: &BTreeSet<String>) {
        for flavor in flavors {
            self.flavor_referrers
                .entry(flavor.clone())
                .or_default()
                .insert(queue.to_string());
        }
    }

    fn unindex_referrers(&mut self, queue: &str, flavors: &BTreeSet<String>) {
        for flavor in flavors {
            if let Some(referrers) = self.flavor_referrers.get_mut(flavor) {
                referrers.remove(queue);
                if referrers.is_empty() {
                    self.flavor_referrers.remove(flavor);
                }
            }
        }
    }

    /// Recompute derived state on every queue referencing `flavor`.
    fn refresh_referrers_of(&mut self, flavor: &str) {
        let Some(referrers) = self.flavor_referrers.get(flavor).cloned() else {
            return;
        };
        for name in referrers {
            if let Some(cq) = self.cluster_queues.get_mut(&name) {
                cq.refresh_derived(&self.flavors);
            }
        }
    }

    /// Resolve a pending assume for this workload, if any: a confirmation
    /// at the assumed queue just clears the flag (usage stays booked); an
    /// assume parked at a different queue is rolled back there.
    fn cleanup_assumed(&mut self, workload: &Workload, metrics: Option<&CacheMetrics>) {
        let key = workload.key();
        let Some(owner) = self.assumed_workloads.remove(&key) else {
            return;
        };
        let target = workload.admission.as_ref().map(|a| a.cluster_queue.as_str());
        if let Some(cq) = self.cluster_queues.get_mut(&owner) {
            if target == Some(owner.as_str()) {
                cq.assumed_workloads.remove(&key);
            } else {
                cq.delete_workload(&key, metrics);
            }
        }
    }
}
