use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A builder was finalized without a required field.
    #[error("insufficient argument: {field} is required")]
    InsufficientArgument { field: &'static str },

    /// The stored conversational context is not an in-process continuation.
    #[error("unsupported user context stored for {key}")]
    UnsupportedContext { key: String },

    #[error(transparent)]
    Config(#[from] sarah_config::Error),

    /// A command or continuation returned an error.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn insufficient_argument(field: &'static str) -> Self {
        Self::InsufficientArgument { field }
    }

    #[must_use]
    pub fn unsupported_context(key: impl Into<String>) -> Self {
        Self::UnsupportedContext { key: key.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned to an adapter when an input could not be handed to a worker.
///
/// `continuous_count` is the number of consecutive failures including this
/// one; it resets after the next accepted input.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("input blocked ({continuous_count} consecutive)")]
pub struct BlockedInputError {
    pub continuous_count: u64,
}

/// Errors an adapter reports to the runner.
#[derive(Debug, Error)]
pub enum BotError {
    /// The bot cannot keep running; the runner stops it and alerts.
    #[error("non-continuable bot error: {0:#}")]
    NonContinuable(anyhow::Error),

    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl BotError {
    #[must_use]
    pub fn non_continuable(error: impl Into<anyhow::Error>) -> Self {
        Self::NonContinuable(error.into())
    }

    pub fn is_non_continuable(&self) -> bool {
        matches!(self, Self::NonContinuable(_))
    }
}
