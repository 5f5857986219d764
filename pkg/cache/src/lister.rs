use anyhow::Result;
use pkg_types::workload::Workload;
use std::sync::RwLock;

/// Source of admitted workloads whose admission was observed before their
/// cluster-queue became known. `Cache::add_cluster_queue` consults it
/// before taking the write lock, so implementations must not block
/// indefinitely; an error aborts the add with no cache mutation.
pub trait WorkloadLister: Send + Sync {
    /// All admitted workloads whose admission names `cluster_queue`.
    fn list_admitted(&self, cluster_queue: &str) -> Result<Vec<Workload>>;
}

/// In-memory lister, used to wire processes that re-attach nothing at
/// startup and as the seam for tests.
#[derive(Default)]
pub struct InMemoryWorkloadLister {
    workloads: RwLock<Vec<Workload>>,
}

impl InMemoryWorkloadLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workload: Workload) {
        self.workloads.write().unwrap().push(workload);
    }
}

impl WorkloadLister for InMemoryWorkloadLister {
    fn list_admitted(&self, cluster_queue: &str) -> Result<Vec<Workload>> {
        let workloads = self.workloads.read().unwrap();
        Ok(workloads
            .iter()
            .filter(|w| {
                w.admission
                    .as_ref()
                    .is_some_and(|a| a.cluster_queue == cluster_queue)
            })
            .cloned()
            .collect())
    }
}
