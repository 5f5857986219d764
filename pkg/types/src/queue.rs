use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A namespaced submission point binding user workloads to a cluster-queue.
/// The cache does not store queues; the type backs the published indexers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub namespace: String,
    pub cluster_queue: String,
    pub created_at: DateTime<Utc>,
}
