use ingestor_types::Location;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(Location),

    /// The container or key cannot be mapped onto the backend.
    #[error("invalid location {location}: {reason}")]
    InvalidLocation { location: Location, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend failure that is not plain I/O (lock poisoning, remote errors).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
