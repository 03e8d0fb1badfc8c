use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every worker is busy and the queue is full.
    #[error("worker queue is full")]
    QueueOverflow,

    /// The pool's cancellation token has fired.
    #[error("enqueue after worker shutdown")]
    EnqueueAfterShutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
