//! In-memory record store for testing and ephemeral use.
//!
//! [`InMemoryRecordStore`] keeps a [`RecordTable`] behind a `RwLock`. Every
//! trait method takes the lock once, so each conditional write is atomic.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::error::{RecordError, Result};
use crate::table::RecordTable;
use crate::traits::{RecordStore, ScanFilter};

/// An in-memory implementation of [`RecordStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl InMemoryRecordStore {
    /// Create a new empty record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, including failed ones.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T>(&self, f: impl FnOnce(&RecordTable) -> T) -> Result<T> {
        let table = self
            .table
            .read()
            .map_err(|e| RecordError::Persistence(format!("lock poisoned: {e}")))?;
        Ok(f(&table))
    }

    fn write<T>(&self, f: impl FnOnce(&mut RecordTable) -> Result<T>) -> Result<T> {
        let mut table = self
            .table
            .write()
            .map_err(|e| RecordError::Persistence(format!("lock poisoned: {e}")))?;
        f(&mut table)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_raw(&self, record: FileRecord) -> Result<()> {
        self.write(|t| t.create_raw(record))
    }

    async fn finalize(
        &self,
        id: &FileId,
        dest: Location,
        status: FileStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<FileRecord> {
        self.write(|t| t.finalize(id, dest, status, processed_at))
    }

    async fn mark_failed(&self, id: &FileId, reason: &str) -> Result<FileRecord> {
        self.write(|t| t.mark_failed(id, reason))
    }

    async fn get(&self, id: &FileId) -> Result<Option<FileRecord>> {
        self.read(|t| t.get(id))
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<FileRecord>> {
        self.read(|t| t.scan(filter))
    }
}
