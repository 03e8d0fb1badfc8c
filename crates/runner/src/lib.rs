//! Top-level orchestration.
//!
//! A [`Runner`] owns the bots, the worker pool, the scheduler and the config
//! watcher. Each bot runs under its own child cancellation token: a fatal
//! error in one bot stops that bot (and alerts) without touching the others.

pub mod alert;
pub mod builder;
pub mod error;
mod runner;
pub mod status;

pub use {
    alert::{AlertError, AlertErrors, Alerter, alert_all},
    builder::RunnerBuilder,
    error::{Error, Result},
    runner::Runner,
    status::{BotStatus, Status, StatusHandle},
};
