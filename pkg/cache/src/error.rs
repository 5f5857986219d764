use pkg_types::quantity::QuantityError;

/// Typed failures surfaced by cache operations. None are retried
/// internally; callers translate them into status conditions on the
/// orchestrator objects they manage.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cluster queue {0:?} already exists")]
    AlreadyExists(String),

    #[error("cluster queue not found")]
    ClusterQueueNotFound,

    #[error("old cluster queue doesn't exist")]
    OldClusterQueueMissing,

    #[error("new cluster queue doesn't exist")]
    NewClusterQueueMissing,

    #[error("workload already exists in cluster queue {0:?}")]
    WorkloadAlreadyExists(String),

    #[error("the workload is not assumed")]
    NotAssumed,

    #[error(transparent)]
    InvalidQuantity(#[from] QuantityError),

    #[error("listing admitted workloads for cluster queue {cluster_queue:?}")]
    ListWorkloads {
        cluster_queue: String,
        #[source]
        source: anyhow::Error,
    },
}
