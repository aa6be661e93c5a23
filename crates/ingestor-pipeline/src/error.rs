use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ingestor_digest::DigestError;
use ingestor_records::RecordError;
use ingestor_store::{RelocateError, StoreError};
use ingestor_types::{FileId, Location};

/// A step of the ingestion sequence, used to attribute failures and timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Fetch object metadata.
    Head,
    /// Stream the object through the digest computer.
    Hash,
    /// Create the RAW record.
    Record,
    /// Copy-then-delete to the processed location.
    Relocate,
    /// Conditional RAW to PROCESSED update.
    Finalize,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Hash => "hash",
            Self::Record => "record",
            Self::Relocate => "relocate",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the pipeline and the reconciler.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The event does not describe a file.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The object named by the event is not in the store.
    #[error("object not found: {0}")]
    NotFound(Location),

    /// The object could not be read to completion while hashing.
    #[error("read error: {0}")]
    Read(#[from] DigestError),

    /// The object could not be opened for hashing.
    #[error("read error: {0}")]
    Unreadable(#[source] StoreError),

    /// Relocation failed before the source was touched.
    #[error("copy failed: {0}")]
    CopyFailed(#[source] RelocateError),

    /// Relocation copied the object but left the source behind.
    #[error("delete failed: {0}")]
    DeleteFailed(#[source] RelocateError),

    /// A conditional record update found the record no longer RAW.
    #[error("precondition failed: {0}")]
    PreconditionFailed(#[source] RecordError),

    /// An active record already exists for this id.
    #[error("record already exists: {0}")]
    AlreadyExists(FileId),

    /// The metadata store could not be reached or written.
    #[error("persistence error: {0}")]
    Persistence(#[source] RecordError),

    /// The object store failed outside of relocation.
    #[error("object store error: {0}")]
    Store(#[source] StoreError),

    /// A store call exceeded the configured bound.
    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Stable name of the failure kind, for logs and structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "InvalidEvent",
            Self::NotFound(_) => "NotFound",
            Self::Read(_) | Self::Unreadable(_) => "ReadError",
            Self::CopyFailed(_) => "CopyFailed",
            Self::DeleteFailed(_) => "DeleteFailed",
            Self::PreconditionFailed(_) => "PreconditionFailed",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::Persistence(_) => "PersistenceError",
            Self::Store(_) => "StoreError",
            Self::Timeout { .. } => "Timeout",
            Self::Config(_) => "ConfigError",
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(location) => Self::NotFound(location),
            other => Self::Store(other),
        }
    }
}

impl From<RelocateError> for IngestError {
    fn from(e: RelocateError) -> Self {
        if e.is_partial() {
            Self::DeleteFailed(e)
        } else {
            Self::CopyFailed(e)
        }
    }
}

impl From<RecordError> for IngestError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::AlreadyExists { id } => Self::AlreadyExists(id),
            e @ RecordError::PreconditionFailed { .. } => Self::PreconditionFailed(e),
            other => Self::Persistence(other),
        }
    }
}

/// Structured failure of one event: which step, for which object, and why.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed for {location}: {error}")]
pub struct StepFailure {
    pub step: Step,
    pub location: Location,
    /// Set once the RAW record exists; a reconciler can resume from it.
    pub record_id: Option<FileId>,
    #[source]
    pub error: IngestError,
}

impl StepFailure {
    /// Returns `true` if a RAW record was left behind for reconciliation.
    pub fn left_raw_record(&self) -> bool {
        self.record_id.is_some()
    }
}
