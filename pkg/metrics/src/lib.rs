use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

pub const ADMITTED_WORKLOADS: &str = "admission_cache_admitted_workloads";
pub const ASSUMED_WORKLOADS: &str = "admission_cache_assumed_workloads";
pub const CLUSTER_QUEUES: &str = "admission_cache_cluster_queues";
pub const PENDING_CLUSTER_QUEUES: &str = "admission_cache_pending_cluster_queues";
pub const USAGE_UNDERFLOW_TOTAL: &str = "admission_cache_usage_underflow_total";

/// The admission cache's metrics hook: a fixed set of thread-safe series
/// that renders in Prometheus text exposition format.
///
/// The cache reports absolute totals computed under its own lock, so the
/// gauges never drift from the accounted state.
pub struct CacheMetrics {
    /// Workloads currently charged to a queue.
    admitted_workloads: AtomicI64,
    /// Workloads provisionally charged, awaiting confirmation.
    assumed_workloads: AtomicI64,
    /// Known cluster queues.
    cluster_queues: AtomicI64,
    /// Cluster queues waiting on a resource flavor.
    pending_cluster_queues: AtomicI64,
    /// Usage subtractions that saturated at zero.
    usage_underflow_total: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            admitted_workloads: AtomicI64::new(0),
            assumed_workloads: AtomicI64::new(0),
            cluster_queues: AtomicI64::new(0),
            pending_cluster_queues: AtomicI64::new(0),
            usage_underflow_total: AtomicU64::new(0),
        }
    }

    /// Record the cache's totals after a mutation.
    pub fn record_totals(&self, admitted: usize, assumed: usize, queues: usize, pending: usize) {
        self.admitted_workloads
            .store(admitted as i64, Ordering::Relaxed);
        self.assumed_workloads
            .store(assumed as i64, Ordering::Relaxed);
        self.cluster_queues.store(queues as i64, Ordering::Relaxed);
        self.pending_cluster_queues
            .store(pending as i64, Ordering::Relaxed);
    }

    /// Count a usage subtraction that saturated; each one means the cache
    /// and its event source disagreed.
    pub fn usage_underflow(&self) {
        self.usage_underflow_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted_workloads(&self) -> i64 {
        self.admitted_workloads.load(Ordering::Relaxed)
    }

    pub fn assumed_workloads(&self) -> i64 {
        self.assumed_workloads.load(Ordering::Relaxed)
    }

    pub fn cluster_queues(&self) -> i64 {
        self.cluster_queues.load(Ordering::Relaxed)
    }

    pub fn pending_cluster_queues(&self) -> i64 {
        self.pending_cluster_queues.load(Ordering::Relaxed)
    }

    pub fn usage_underflows(&self) -> u64 {
        self.usage_underflow_total.load(Ordering::Relaxed)
    }

    /// Render every series in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        let gauges = [
            (
                ADMITTED_WORKLOADS,
                "Workloads currently charged to a queue",
                self.admitted_workloads(),
            ),
            (
                ASSUMED_WORKLOADS,
                "Workloads provisionally charged",
                self.assumed_workloads(),
            ),
            (CLUSTER_QUEUES, "Known cluster queues", self.cluster_queues()),
            (
                PENDING_CLUSTER_QUEUES,
                "Cluster queues waiting on a resource flavor",
                self.pending_cluster_queues(),
            ),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output.push_str(&format!(
            "# HELP {} Usage subtractions that saturated at zero\n",
            USAGE_UNDERFLOW_TOTAL
        ));
        output.push_str(&format!("# TYPE {} counter\n", USAGE_UNDERFLOW_TOTAL));
        output.push_str(&format!(
            "{} {}\n",
            USAGE_UNDERFLOW_TOTAL,
            self.usage_underflows()
        ));

        output
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
