//! Transition rules shared by every record store backend.
//!
//! [`RecordTable`] is a plain, synchronous map of records that enforces the
//! lifecycle invariants. Backends wrap it in whatever locking and
//! persistence they need and delegate every decision to it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::error::{RecordError, Result};
use crate::traits::ScanFilter;

/// Records keyed by id, kept in id order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordTable {
    records: BTreeMap<FileId, FileRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from stored records. A later duplicate id replaces an
    /// earlier one.
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn create_raw(&mut self, record: FileRecord) -> Result<()> {
        if record.status != FileStatus::Raw {
            return Err(RecordError::Invalid {
                id: record.id,
                reason: format!("new records must be RAW, got {}", record.status),
            });
        }
        if record.processed_at.is_some() {
            return Err(RecordError::Invalid {
                id: record.id,
                reason: "new records must not carry processedAt".into(),
            });
        }
        if let Some(existing) = self.records.get(&record.id) {
            if existing.is_active() {
                return Err(RecordError::AlreadyExists { id: record.id });
            }
            debug!(id = %record.id, "replacing failed record");
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn finalize(
        &mut self,
        id: &FileId,
        dest: Location,
        status: FileStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<FileRecord> {
        if status != FileStatus::Processed {
            return Err(RecordError::Invalid {
                id: id.clone(),
                reason: format!("finalize target must be PROCESSED, got {status}"),
            });
        }
        let record = self.raw_record_mut(id)?;
        record.location = dest;
        record.status = FileStatus::Processed;
        record.processed_at = Some(processed_at);
        Ok(record.clone())
    }

    pub fn mark_failed(&mut self, id: &FileId, reason: &str) -> Result<FileRecord> {
        let record = self.raw_record_mut(id)?;
        record.status = FileStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        Ok(record.clone())
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        self.records.get(id).cloned()
    }

    pub fn scan(&self, filter: &ScanFilter) -> Vec<FileRecord> {
        self.records
            .values()
            .filter(|r| filter.matches(r))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    /// The record for `id`, provided it is still RAW.
    fn raw_record_mut(&mut self, id: &FileId) -> Result<&mut FileRecord> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RecordError::NotFound { id: id.clone() })?;
        if record.status != FileStatus::Raw {
            return Err(RecordError::PreconditionFailed {
                id: id.clone(),
                current: record.status,
            });
        }
        Ok(record)
    }
}
