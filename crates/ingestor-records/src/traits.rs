//! The [`RecordStore`] trait defining the metadata storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::error::Result;

/// Result limit applied when a scan does not set one.
pub const DEFAULT_SCAN_LIMIT: usize = 100;

/// Selection criteria for [`RecordStore::scan`].
///
/// All criteria are optional and combine with AND. The time range applies to
/// `processed_at` and is inclusive on both ends; `created_before` bounds
/// `created_at` inclusively. The limit applies after every criterion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanFilter {
    pub status: Option<FileStatus>,
    pub processed_from: Option<DateTime<Utc>>,
    pub processed_to: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            status: None,
            processed_from: None,
            processed_to: None,
            created_before: None,
            limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl ScanFilter {
    /// Match every record, up to the default limit.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: FileStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn processed_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.processed_from = from;
        self.processed_to = to;
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Returns `true` if `record` satisfies every criterion.
    pub fn matches(&self, record: &FileRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(at) = self.created_before {
            if record.created_at > at {
                return false;
            }
        }
        if self.processed_from.is_some() || self.processed_to.is_some() {
            return record.processed_within(self.processed_from, self.processed_to);
        }
        true
    }
}

/// Storage interface for file lifecycle records.
///
/// Implementors must make each method atomic with respect to the others:
/// the conditional checks in `create_raw`, `finalize` and `mark_failed` are
/// evaluated and applied as one step.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new RAW record.
    ///
    /// Fails with `AlreadyExists` if an active record exists for the id. A
    /// FAILED record is replaced.
    async fn create_raw(&self, record: FileRecord) -> Result<()>;

    /// Move a RAW record to `status` at its final location.
    ///
    /// Fails with `PreconditionFailed` unless the stored status is RAW, and
    /// with `NotFound` if there is no record. Only `PROCESSED` is accepted as
    /// the target status; use [`RecordStore::mark_failed`] for failures.
    async fn finalize(
        &self,
        id: &FileId,
        dest: Location,
        status: FileStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<FileRecord>;

    /// Move a RAW record to FAILED, keeping its location.
    async fn mark_failed(&self, id: &FileId, reason: &str) -> Result<FileRecord>;

    /// Point lookup.
    async fn get(&self, id: &FileId) -> Result<Option<FileRecord>>;

    /// Records matching `filter`, ordered by id, at most `filter.limit`.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<FileRecord>>;
}
