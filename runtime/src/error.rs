//! Error types for the Strand runtime.

use thiserror::Error;

/// Why a task did not produce a result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The performer rejected the task.
    #[error("task failed: {0}")]
    Failed(String),

    /// The task's settlement was rejected by the queue (skip, shift or
    /// clear) before it produced a result.
    #[error("task cancelled: {0}")]
    Cancelled(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        TaskError::Cancelled(message.into())
    }
}

impl From<Error> for TaskError {
    fn from(err: Error) -> Self {
        match err {
            Error::Task(task) => task,
            other => TaskError::Failed(other.to_string()),
        }
    }
}

/// All possible errors from the Strand runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transform id is not in the log.
    #[error("transform {0} not logged")]
    NotLogged(String),

    /// A resolved log position is outside the valid range.
    #[error("log position {0} out of range")]
    OutOfRange(isize),

    /// The transform id is already in the log.
    #[error("transform {0} already logged")]
    AlreadyLogged(String),

    /// The bucket failed to read or write.
    #[error("bucket error: {0}")]
    Bucket(String),

    #[error("a name is required when a bucket is supplied")]
    MissingName,

    /// Persisted state could not be decoded.
    #[error("invalid persisted state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("engine error: {0}")]
    Engine(#[from] strand_engine::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
