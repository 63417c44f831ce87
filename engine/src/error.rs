//! Error types for the Strand engine.

use crate::RecordIdentity;
use thiserror::Error;

/// All possible errors from the Strand engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The target record of an operation or query does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordIdentity),

    /// A query expression (or one of its filter/sort/page specifiers) could
    /// not be understood.
    #[error("query expression parse error: {0}")]
    QueryExpressionParse(String),

    /// The record accessor failed to read or write.
    #[error("accessor error: {0}")]
    Accessor(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A batch failed and undoing its earlier operations failed too, so the
    /// accessor may hold part of the batch.
    #[error("{error}; undo failed: {undo}")]
    UndoFailed { error: Box<Error>, undo: Box<Error> },
}

impl Error {
    pub(crate) fn undo_failed(error: Error, undo: Error) -> Self {
        Error::UndoFailed {
            error: Box::new(error),
            undo: Box::new(undo),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
