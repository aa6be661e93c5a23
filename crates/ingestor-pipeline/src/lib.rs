//! Ingestion pipeline for uploaded objects.
//!
//! Every object-created event runs through the same sequence: head the
//! object, hash its content, create a RAW record, relocate the object to the
//! processed container, and finalize the record as PROCESSED. Keys ending in
//! the delimiter are directory markers and are skipped.
//!
//! The pipeline never retries. A failure after the RAW record exists leaves
//! the record behind, and the [`Reconciler`] later finishes the job from
//! wherever the object actually is.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ingestor_pipeline::{IngestConfig, IngestPipeline, ObjectCreatedEvent};
//! use ingestor_records::InMemoryRecordStore;
//! use ingestor_store::{InMemoryObjectStore, ObjectStore};
//! use ingestor_types::Location;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let objects = Arc::new(InMemoryObjectStore::new());
//! let records = Arc::new(InMemoryRecordStore::new());
//! objects
//!     .put(&Location::new("ingestor-raw", "fileA.txt"), "hello".into(), "text/plain")
//!     .await
//!     .unwrap();
//!
//! let pipeline = IngestPipeline::new(objects, records, IngestConfig::default()).unwrap();
//! let outcome = pipeline
//!     .process(&ObjectCreatedEvent::new("ingestor-raw", "fileA.txt"))
//!     .await
//!     .unwrap();
//! assert!(outcome.is_processed());
//! # });
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod outcome;
pub mod pipeline;
pub mod reconcile;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use config::{IngestConfig, ENV_PROCESSED_CONTAINER, ENV_RAW_CONTAINER};
pub use error::{IngestError, Step, StepFailure};
pub use event::{decode_key, NotificationEnvelope, ObjectCreatedEvent};
pub use outcome::{IngestOutcome, StepTiming};
pub use pipeline::IngestPipeline;
pub use reconcile::{ActionKind, ReconcileAction, ReconcileReport, Reconciler, MISSING_OBJECT_REASON};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::{Duration, Utc};
    use ingestor_records::{JsonFileRecordStore, RecordStore, ScanFilter};
    use ingestor_store::{FsObjectStore, ObjectStore};
    use ingestor_types::{FileId, FileStatus, Location};

    // -----------------------------------------------------------------------
    // Filesystem objects and a JSON record file, end to end
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn end_to_end_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::new(dir.path().join("objects")));
        let records = Arc::new(JsonFileRecordStore::open(dir.path().join("files.json")).unwrap());
        let config = IngestConfig::default();

        let body = Bytes::from(vec![b'x'; 1024]);
        objects
            .put(&Location::new("ingestor-raw", "fileA.txt"), body, "text/plain")
            .await
            .unwrap();
        objects
            .put(&Location::new("ingestor-raw", "docs/readme.md"), Bytes::from_static(b"# hi"), "")
            .await
            .unwrap();

        let pipeline =
            IngestPipeline::new(objects.clone(), records.clone(), config.clone()).unwrap();
        for key in ["fileA.txt", "docs/readme.md", "docs/"] {
            pipeline
                .process(&ObjectCreatedEvent::new("ingestor-raw", key))
                .await
                .unwrap();
        }

        let done = records
            .scan(&ScanFilter::all().with_status(FileStatus::Processed))
            .await
            .unwrap();
        assert_eq!(done.len(), 2);
        let a = records.get(&FileId::from_key("fileA.txt")).await.unwrap().unwrap();
        assert_eq!(
            a.location,
            Location::new("ingestor-processed", "processed/fileA.txt")
        );
        assert_eq!(a.size, 1024);
        assert!(objects.exists(&a.location).await.unwrap());

        // Nothing left for the reconciler.
        let reconciler = Reconciler::new(objects, records, config).unwrap();
        let report = reconciler
            .reconcile_at(Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.examined, 0);
    }

    // -----------------------------------------------------------------------
    // Records survive a restart and the reconciler picks them up
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn reconcile_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::new(dir.path().join("objects")));
        let path = dir.path().join("files.json");
        let source = Location::new("ingestor-raw", "late.csv");
        let meta = objects
            .put(&source, Bytes::from_static(b"a,b\n1,2\n"), "text/csv")
            .await
            .unwrap();

        {
            // A run that died after recording the file.
            let records = JsonFileRecordStore::open(&path).unwrap();
            let record = ingestor_types::FileRecord::raw(
                source.clone(),
                &meta,
                "00",
                Utc::now() - Duration::hours(1),
            );
            records.create_raw(record).await.unwrap();
        }

        let records = Arc::new(JsonFileRecordStore::open(&path).unwrap());
        let reconciler =
            Reconciler::new(objects.clone(), records.clone(), IngestConfig::default()).unwrap();
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.count(ActionKind::Resumed), 1);

        let record = records.get(&FileId::from_key("late.csv")).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Processed);
        assert_eq!(record.checksum, "00");
        assert!(!objects.exists(&source).await.unwrap());
    }
}
