//! In-memory accounting core for the batch admission controller: quota
//! pools (cluster-queues), cohort borrowing, admitted and assumed workload
//! charges, all behind one coarse lock.

pub mod cache;
pub mod cluster_queue;
pub mod cohort;
pub mod error;
pub mod lister;
pub mod snapshot;

pub use cache::{Cache, CohortTotals};
pub use cluster_queue::{
    Charge, ClusterQueue, ClusterQueueStatus, FlavorLimits, FlavorUsage, Resources, WorkloadInfo,
};
pub use cohort::Cohort;
pub use error::CacheError;
pub use lister::{InMemoryWorkloadLister, WorkloadLister};
pub use snapshot::{ClusterQueueSnapshot, CohortSnapshot, Snapshot};
