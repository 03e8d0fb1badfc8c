//! Fixed-size worker pool draining a bounded job queue.
//!
//! Enqueueing never blocks: when every worker is busy and the queue is full
//! the job is refused with [`Error::QueueOverflow`], so a slow handler can
//! never stall message reception.

pub mod error;
pub mod pool;
pub mod reporter;

pub use {
    error::{Error, Result},
    pool::{DefaultWorker, Job, Worker, run, run_with_reporter},
    reporter::{LogReporter, Reporter, Stats},
};
