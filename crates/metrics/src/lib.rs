//! Metrics collection and export for sarah.
//!
//! Runtime crates record through the `metrics` facade behind their own
//! `metrics` feature; this crate owns the metric names and, with the
//! `prometheus` feature, the exporter that renders them.
//!
//! ```rust,ignore
//! use sarah_metrics::{counter, gauge, workers};
//!
//! counter!(workers::JOBS_ENQUEUED_TOTAL).increment(1);
//! gauge!(workers::QUEUE_DEPTH).set(3.0);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
