use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [`Gateway`](super::Gateway)
#[derive(Default)]
pub struct Metrics {
    /// Number of read attempts (including retries)
    pub reads: Counter,
    /// Number of submitted writes
    pub writes: Counter,
    /// Number of reads retried after a transient failure
    pub retries: Counter,
    /// Number of writes not observed before the deadline
    pub timeouts: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register("reads", "Number of read attempts", metrics.reads.clone());
        context.register("writes", "Number of submitted writes", metrics.writes.clone());
        context.register(
            "retries",
            "Number of reads retried after a transient failure",
            metrics.retries.clone(),
        );
        context.register(
            "timeouts",
            "Number of writes not observed before the deadline",
            metrics.timeouts.clone(),
        );
        metrics
    }
}
