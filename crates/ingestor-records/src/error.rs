//! Error types for record store operations.

use thiserror::Error;

use ingestor_types::{FileId, FileStatus};

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An active (non-failed) record already exists for this id.
    #[error("record already exists: {id}")]
    AlreadyExists { id: FileId },

    /// The record was not found.
    #[error("record not found: {id}")]
    NotFound { id: FileId },

    /// The conditional update found the record in a status other than RAW.
    #[error("precondition failed for {id}: status is {current}, expected RAW")]
    PreconditionFailed { id: FileId, current: FileStatus },

    /// The record or requested transition is malformed.
    #[error("invalid record {id}: {reason}")]
    Invalid { id: FileId, reason: String },

    /// The backing store could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based record operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
