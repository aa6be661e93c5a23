use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid file status: {0}")]
    InvalidStatus(String),

    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),
}
