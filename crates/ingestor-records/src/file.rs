//! Record store persisted as one JSON document.
//!
//! The file on disk is the only copy of the table. Every mutation takes an
//! exclusive OS lock on a sidecar `<file>.lock`, reloads the table, applies
//! the conditional transition and rewrites the file, so handles in separate
//! processes see each other's writes and the RAW precondition holds across
//! them. A rewrite goes to a temporary file in the same directory which is
//! then renamed over the target; readers never observe a half-written table
//! and therefore read without the lock.
//!
//! All file I/O runs on the blocking pool. Suitable for the command-line tool
//! and small deployments; every write is O(table size).

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use tracing::{debug, warn};

use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::error::{RecordError, Result};
use crate::table::RecordTable;
use crate::traits::{RecordStore, ScanFilter};

/// A [`RecordStore`] backed by a JSON array of records on disk.
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileRecordStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// An existing file is parsed once here so a corrupt table is reported at
    /// open rather than on first use.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = load(&path)?;
        debug!(path = %path.display(), records = table.len(), "opened record file");
        let lock_path = lock_path_for(&path);
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the table under the exclusive lock, apply `f`, persist.
    ///
    /// A rejected transition returns before anything is written.
    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut RecordTable) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        blocking(move || {
            let _lock = TableLock::exclusive(&lock_path)?;
            let mut table = load(&path)?;
            let out = f(&mut table)?;
            persist(&path, &table)?;
            Ok(out)
        })
        .await
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordTable) -> T + Send + 'static,
    {
        let path = self.path.clone();
        blocking(move || load(&path).map(|table| f(&table))).await
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn create_raw(&self, record: FileRecord) -> Result<()> {
        self.mutate(move |t| t.create_raw(record)).await
    }

    async fn finalize(
        &self,
        id: &FileId,
        dest: Location,
        status: FileStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<FileRecord> {
        let id = id.clone();
        self.mutate(move |t| t.finalize(&id, dest, status, processed_at))
            .await
    }

    async fn mark_failed(&self, id: &FileId, reason: &str) -> Result<FileRecord> {
        let id = id.clone();
        let reason = reason.to_string();
        self.mutate(move |t| t.mark_failed(&id, &reason)).await
    }

    async fn get(&self, id: &FileId) -> Result<Option<FileRecord>> {
        let id = id.clone();
        self.read(move |t| t.get(&id)).await
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<FileRecord>> {
        let filter = filter.clone();
        self.read(move |t| t.scan(&filter)).await
    }
}

// ---------------------------------------------------------------------------
// File helpers (blocking)
// ---------------------------------------------------------------------------

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RecordError::Persistence(format!("record file task failed: {e}")))?
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn load(path: &Path) -> Result<RecordTable> {
    match fs::read(path) {
        Ok(bytes) => {
            let records: Vec<FileRecord> = serde_json::from_slice(&bytes)
                .map_err(|e| RecordError::Serialization(format!("{}: {e}", path.display())))?;
            Ok(RecordTable::from_records(records))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RecordTable::new()),
        Err(e) => Err(e.into()),
    }
}

fn persist(path: &Path, table: &RecordTable) -> Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;
    let records: Vec<&FileRecord> = table.records().collect();
    let json = serde_json::to_vec_pretty(&records)
        .map_err(|e| RecordError::Serialization(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| RecordError::Persistence(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Exclusive OS-level lock on the sidecar file, released on drop.
struct TableLock {
    file: File,
    path: PathBuf,
}

impl TableLock {
    fn exclusive(path: &Path) -> Result<Self> {
        fs::create_dir_all(parent_dir(path))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release record file lock");
        }
    }
}
