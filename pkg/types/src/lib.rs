pub mod cluster_queue;
pub mod flavor;
pub mod quantity;
pub mod queue;
pub mod workload;
