use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty schedule")]
    EmptySchedule,

    #[error("invalid cron expression '{expr}': {source}")]
    CronParse {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("invalid interval '{input}': {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    /// The entry's owner was cancelled before the entry could be scheduled.
    #[error("owner of the scheduled task has stopped")]
    OwnerStopped,

    /// The scheduler actor has stopped.
    #[error("scheduler is not running")]
    NotRunning,
}

impl Error {
    #[must_use]
    pub fn invalid_interval(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            input: input.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
