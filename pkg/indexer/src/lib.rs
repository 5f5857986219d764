//! Stateless index-key extractors published for the external indexing
//! library. Each maps an orchestrator object to the string keys it should
//! be findable under.

use pkg_types::queue::Queue;
use pkg_types::workload::Workload;

pub const QUEUE_CLUSTER_QUEUE_KEY: &str = "spec.clusterQueue";
pub const WORKLOAD_QUEUE_KEY: &str = "spec.queueName";
pub const WORKLOAD_CLUSTER_QUEUE_KEY: &str = "spec.admission.clusterQueue";

/// Index a queue under the cluster-queue it feeds.
pub fn index_queue_cluster_queue(queue: &Queue) -> Vec<String> {
    vec![queue.cluster_queue.clone()]
}

/// Index a workload under the queue it was submitted to.
pub fn index_workload_queue(workload: &Workload) -> Vec<String> {
    vec![workload.queue_name.clone()]
}

/// Index a workload under the cluster-queue it was admitted to. Workloads
/// that were never admitted produce no keys.
pub fn index_workload_cluster_queue(workload: &Workload) -> Vec<String> {
    match &workload.admission {
        Some(admission) => vec![admission.cluster_queue.clone()],
        None => Vec::new(),
    }
}
