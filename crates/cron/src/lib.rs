//! Recurring task scheduler.
//!
//! A single actor task owns every scheduled entry; [`SchedulerHandle`] talks
//! to it over a request channel and waits for each reply. Entries are keyed
//! by bot type and task identifier, and registering an identifier again
//! replaces the previous entry.

pub mod error;
pub mod parse;
pub mod schedule;
pub mod scheduler;

pub use {
    error::{Error, Result},
    schedule::Schedule,
    scheduler::{Entry, JobFn, SchedulerHandle, run, run_in},
};
