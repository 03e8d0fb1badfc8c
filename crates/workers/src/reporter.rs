use {async_trait::async_trait, tracing::info};

#[cfg(feature = "metrics")]
use sarah_metrics::{gauge, workers as worker_metrics};

/// Queue statistics sampled by the pool supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Jobs accepted but not yet picked up by a worker.
    pub queue_size: usize,
}

/// Receives periodic queue statistics, e.g. to feed an external metrics system.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, stats: Stats);
}

/// Default reporter: logs the depth and, with the `metrics` feature, sets the
/// queue depth gauge.
#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    async fn report(&self, stats: Stats) {
        info!(queue_size = stats.queue_size, "worker queue stats");
        #[cfg(feature = "metrics")]
        gauge!(worker_metrics::QUEUE_DEPTH).set(stats.queue_size as f64);
    }
}
