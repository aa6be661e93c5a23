//! Fault-injecting store wrappers shared by the pipeline and reconciler tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, ReadBuf};

use ingestor_records::{InMemoryRecordStore, RecordError, RecordStore, ScanFilter};
use ingestor_store::{ByteStream, InMemoryObjectStore, ObjectStore, StoreError, StoreResult};
use ingestor_types::{FileId, FileRecord, FileStatus, Location, ObjectMeta};

use crate::config::IngestConfig;
use crate::pipeline::IngestPipeline;

/// Object store that can refuse copies or deletes, break reads, or stall heads.
#[derive(Default)]
pub struct FaultyObjects {
    pub inner: InMemoryObjectStore,
    pub fail_copy: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_read: AtomicBool,
    pub fail_open: AtomicBool,
    pub head_delay_ms: AtomicU64,
}

#[async_trait]
impl ObjectStore for FaultyObjects {
    async fn head(&self, location: &Location) -> StoreResult<Option<ObjectMeta>> {
        let delay = self.head_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.head(location).await
    }

    async fn open_read(&self, location: &Location) -> StoreResult<ByteStream> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("open refused".into()));
        }
        if self.fail_read.load(Ordering::SeqCst) {
            // Still report NotFound for absent objects.
            self.inner.open_read(location).await?;
            return Ok(Box::new(BrokenReader));
        }
        self.inner.open_read(location).await
    }

    async fn copy(&self, source: &Location, dest: &Location) -> StoreResult<()> {
        if self.fail_copy.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("copy refused".into()));
        }
        self.inner.copy(source, dest).await
    }

    async fn delete(&self, location: &Location) -> StoreResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("delete refused".into()));
        }
        self.inner.delete(location).await
    }

    async fn put(
        &self,
        location: &Location,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<ObjectMeta> {
        self.inner.put(location, data, content_type).await
    }
}

/// A stream that fails on first read.
pub struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream reset")))
    }
}

/// Record store whose `finalize` can be made to fail, or to lose a race
/// against a concurrent finalize of the same record.
#[derive(Default)]
pub struct FaultyRecords {
    pub inner: InMemoryRecordStore,
    pub fail_finalize: AtomicBool,
    pub lose_finalize_race: AtomicBool,
}

#[async_trait]
impl RecordStore for FaultyRecords {
    async fn create_raw(&self, record: FileRecord) -> ingestor_records::Result<()> {
        self.inner.create_raw(record).await
    }

    async fn finalize(
        &self,
        id: &FileId,
        dest: Location,
        status: FileStatus,
        processed_at: DateTime<Utc>,
    ) -> ingestor_records::Result<FileRecord> {
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(RecordError::Persistence("table unavailable".into()));
        }
        if self.lose_finalize_race.load(Ordering::SeqCst) {
            self.inner
                .finalize(id, dest.clone(), status, processed_at)
                .await?;
        }
        self.inner.finalize(id, dest, status, processed_at).await
    }

    async fn mark_failed(&self, id: &FileId, reason: &str) -> ingestor_records::Result<FileRecord> {
        self.inner.mark_failed(id, reason).await
    }

    async fn get(&self, id: &FileId) -> ingestor_records::Result<Option<FileRecord>> {
        self.inner.get(id).await
    }

    async fn scan(&self, filter: &ScanFilter) -> ingestor_records::Result<Vec<FileRecord>> {
        self.inner.scan(filter).await
    }
}

pub struct Fixture {
    pub objects: Arc<FaultyObjects>,
    pub records: Arc<FaultyRecords>,
    pub pipeline: IngestPipeline,
}

impl Fixture {
    pub fn new(config: IngestConfig) -> Self {
        let objects = Arc::new(FaultyObjects::default());
        let records = Arc::new(FaultyRecords::default());
        let pipeline = IngestPipeline::new(objects.clone(), records.clone(), config).unwrap();
        Self {
            objects,
            records,
            pipeline,
        }
    }

    pub fn raw(key: &str) -> Location {
        Location::new("ingestor-raw", key)
    }

    pub fn processed(key: &str) -> Location {
        Location::new("ingestor-processed", format!("processed/{key}"))
    }

    /// Upload `len` bytes of text to the raw container.
    pub async fn upload(&self, key: &str, len: usize) -> ObjectMeta {
        let body: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
        self.objects
            .put(&Self::raw(key), Bytes::from(body), "text/plain")
            .await
            .unwrap()
    }

    pub async fn record(&self, key: &str) -> Option<FileRecord> {
        self.records.get(&FileId::from_key(key)).await.unwrap()
    }
}
