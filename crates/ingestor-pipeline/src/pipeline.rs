use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use ingestor_digest::{Digest, DigestComputer};
use ingestor_records::RecordStore;
use ingestor_store::{ObjectStore, Relocator, StoreError};
use ingestor_types::{FileId, FileRecord, FileStatus, Location, ObjectMeta};

use crate::config::IngestConfig;
use crate::error::{IngestError, Step, StepFailure};
use crate::event::{NotificationEnvelope, ObjectCreatedEvent};
use crate::outcome::{IngestOutcome, StepTiming};

// ---------------------------------------------------------------------------
// IngestPipeline
// ---------------------------------------------------------------------------

/// Drives one object-created event through hash, record, relocate, finalize.
///
/// The pipeline holds no per-event state. Any number of events may be
/// processed concurrently against the same stores; the record store's
/// conditional writes decide which of several deliveries of one event does
/// the work.
///
/// Failures are never retried here. A failure after the RAW record exists
/// leaves that record in place for the reconciler to resume.
pub struct IngestPipeline {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    relocator: Relocator,
    digests: DigestComputer,
    config: IngestConfig,
}

impl IngestPipeline {
    /// Create a pipeline over the given stores.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        config: IngestConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let digests = config.digest_computer()?;
        Ok(Self {
            relocator: Relocator::new(objects.clone()),
            objects,
            records,
            digests,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Process a single event.
    pub async fn process(
        &self,
        event: &ObjectCreatedEvent,
    ) -> Result<IngestOutcome, StepFailure> {
        let source = event.location();
        if source.is_directory_marker(self.config.delimiter) {
            debug!(location = %source, "directory marker, skipping");
            return Ok(IngestOutcome::Skipped {
                location: source,
                reason: "directory marker".into(),
            });
        }

        let id = FileId::from_key(&source.key);
        let mut timings = Vec::with_capacity(5);
        let fail = |step: Step, record_id: Option<&FileId>, error: IngestError| {
            warn!(id = %id, step = %step, kind = error.kind(), error = %error, "ingestion step failed");
            StepFailure {
                step,
                location: source.clone(),
                record_id: record_id.cloned(),
                error,
            }
        };
        info!(id = %id, location = %source, "processing object");

        // Head
        let started = Instant::now();
        let meta = match self.bounded(Step::Head, self.objects.head(&source)).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                return self
                    .absent_object(&id, &source)
                    .await
                    .map_err(|e| fail(Step::Head, None, e));
            }
            Err(e) => return Err(fail(Step::Head, None, e)),
        };
        timings.push(StepTiming {
            step: Step::Head,
            elapsed: started.elapsed(),
        });
        check_declared(event, &meta);

        // Hash
        let started = Instant::now();
        let digest = match self.hash(&source, &meta).await {
            Ok(digest) => digest,
            Err(IngestError::NotFound(_)) => {
                return self
                    .absent_object(&id, &source)
                    .await
                    .map_err(|e| fail(Step::Hash, None, e));
            }
            Err(e) => return Err(fail(Step::Hash, None, e)),
        };
        timings.push(StepTiming {
            step: Step::Hash,
            elapsed: started.elapsed(),
        });

        // Record
        let started = Instant::now();
        let record = FileRecord::raw(source.clone(), &meta, digest.hex, Utc::now());
        match self
            .bounded(Step::Record, self.records.create_raw(record))
            .await
        {
            Ok(()) => {}
            Err(IngestError::AlreadyExists(existing)) => {
                info!(id = %existing, "record already exists, duplicate delivery");
                return Ok(IngestOutcome::Duplicate { id: existing });
            }
            Err(e) => return Err(fail(Step::Record, None, e)),
        }
        timings.push(StepTiming {
            step: Step::Record,
            elapsed: started.elapsed(),
        });
        debug!(id = %id, checksum = %digest.algorithm, "raw record created");

        // Relocate
        let started = Instant::now();
        let dest = self.config.processed_location(&source);
        self.bounded(Step::Relocate, self.relocator.relocate(&source, &dest))
            .await
            .map_err(|e| fail(Step::Relocate, Some(&id), e))?;
        timings.push(StepTiming {
            step: Step::Relocate,
            elapsed: started.elapsed(),
        });

        // Finalize
        let started = Instant::now();
        let record = self
            .bounded(
                Step::Finalize,
                self.records
                    .finalize(&id, dest, FileStatus::Processed, Utc::now()),
            )
            .await
            .map_err(|e| fail(Step::Finalize, Some(&id), e))?;
        timings.push(StepTiming {
            step: Step::Finalize,
            elapsed: started.elapsed(),
        });

        info!(id = %id, location = %record.location, size = record.size, "object processed");
        Ok(IngestOutcome::Processed { record, timings })
    }

    /// Process every entry of a notification envelope, in order.
    ///
    /// Entries are independent: a failure in one does not stop the rest.
    pub async fn process_envelope(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<Result<IngestOutcome, StepFailure>>, IngestError> {
        let events = envelope.events()?;
        let mut results = Vec::with_capacity(events.len());
        for event in &events {
            results.push(self.process(event).await);
        }
        Ok(results)
    }

    /// Stream the object through the digest computer.
    async fn hash(&self, source: &Location, meta: &ObjectMeta) -> Result<Digest, IngestError> {
        self.bounded(Step::Hash, async {
            let reader = self.objects.open_read(source).await.map_err(|e| match e {
                StoreError::NotFound(location) => IngestError::NotFound(location),
                other => IngestError::Unreadable(other),
            })?;
            Ok::<_, IngestError>(self.digests.compute(reader, Some(meta.size)).await?)
        })
        .await
    }

    /// The object named by the event is gone. That is only expected when an
    /// earlier delivery already recorded and moved it.
    async fn absent_object(
        &self,
        id: &FileId,
        source: &Location,
    ) -> Result<IngestOutcome, IngestError> {
        match self.bounded(Step::Head, self.records.get(id)).await? {
            Some(existing) => {
                info!(id = %id, status = %existing.status, "object already moved, duplicate delivery");
                Ok(IngestOutcome::Duplicate { id: existing.id })
            }
            None => Err(IngestError::NotFound(source.clone())),
        }
    }

    async fn bounded<T, E>(
        &self,
        step: Step,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, IngestError>
    where
        E: Into<IngestError>,
    {
        bounded(self.config.step_timeout(), step, fut).await
    }
}

/// Run one store call under a timeout, attributing an expiry to `step`.
pub(crate) async fn bounded<T, E>(
    after: Duration,
    step: Step,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, IngestError>
where
    E: Into<IngestError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(IngestError::Timeout { step, after }),
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Warn when the notifier's view of the object disagrees with the store.
fn check_declared(event: &ObjectCreatedEvent, meta: &ObjectMeta) {
    if let Some(size) = event.size {
        if size != meta.size {
            warn!(key = %event.key, declared = size, actual = meta.size, "event size differs from stored object");
        }
    }
    if let Some(tag) = &event.entity_tag {
        if tag.trim_matches('"') != meta.entity_tag {
            warn!(key = %event.key, declared = %tag, actual = %meta.entity_tag, "event entity tag differs from stored object");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use bytes::Bytes;
    use ingestor_digest::DigestAlgorithm;
    use ingestor_types::DEFAULT_CONTENT_TYPE;

    use crate::testing::Fixture;

    fn event(key: &str) -> ObjectCreatedEvent {
        ObjectCreatedEvent::new("ingestor-raw", key)
    }

    #[tokio::test]
    async fn happy_path() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 1024).await;

        let outcome = fx
            .pipeline
            .process(&event("fileA.txt").with_size(1024))
            .await
            .unwrap();

        let IngestOutcome::Processed { record, timings } = outcome else {
            panic!("expected processed outcome");
        };
        assert_eq!(record.id, FileId::from_key("fileA.txt"));
        assert_eq!(record.status, FileStatus::Processed);
        assert_eq!(record.location, Fixture::processed("fileA.txt"));
        assert_eq!(record.size, 1024);
        assert_eq!(record.content_type, "text/plain");
        assert_eq!(record.checksum.len(), 64);
        assert!(record.processed_at.unwrap() >= record.created_at);
        assert_eq!(timings.len(), 5);

        assert!(!fx.objects.exists(&Fixture::raw("fileA.txt")).await.unwrap());
        assert!(fx.objects.exists(&Fixture::processed("fileA.txt")).await.unwrap());
        assert_eq!(fx.record("fileA.txt").await.unwrap(), record);
    }

    #[tokio::test]
    async fn directory_marker_is_a_no_op() {
        let fx = Fixture::new(IngestConfig::default());
        let outcome = fx.pipeline.process(&event("reports/2025/")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Skipped { .. }));
        assert!(fx.records.inner.is_empty());
    }

    #[tokio::test]
    async fn redelivery_is_a_duplicate() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 64).await;

        let first = fx.pipeline.process(&event("fileA.txt")).await.unwrap();
        assert!(first.is_processed());
        let second = fx.pipeline.process(&event("fileA.txt")).await.unwrap();
        assert_eq!(
            second,
            IngestOutcome::Duplicate {
                id: FileId::from_key("fileA.txt")
            }
        );
        assert_eq!(fx.records.inner.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_delivery_yields_one_record() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 4096).await;
        let pipeline = Arc::new(fx.pipeline);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.process(&event("fileA.txt")).await })
            })
            .collect();
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        let processed = outcomes.iter().filter(|o| o.is_processed()).count();
        let duplicates = outcomes
            .iter()
            .filter(|o| matches!(o, IngestOutcome::Duplicate { .. }))
            .count();
        assert_eq!((processed, duplicates), (1, 1));
        assert_eq!(fx.records.inner.len(), 1);
        let record = fx.records.get(&FileId::from_key("fileA.txt")).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Processed);
    }

    #[tokio::test]
    async fn missing_object_without_record_is_not_found() {
        let fx = Fixture::new(IngestConfig::default());
        let failure = fx.pipeline.process(&event("ghost.bin")).await.unwrap_err();
        assert_eq!(failure.step, Step::Head);
        assert!(matches!(failure.error, IngestError::NotFound(_)));
        assert!(failure.record_id.is_none());
    }

    #[tokio::test]
    async fn read_error_creates_no_record() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 100).await;
        fx.objects.fail_read.store(true, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Hash);
        assert_eq!(failure.error.kind(), "ReadError");
        assert!(fx.record("fileA.txt").await.is_none());
        assert!(fx.objects.exists(&Fixture::raw("fileA.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn open_failure_is_a_read_error() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 100).await;
        fx.objects.fail_open.store(true, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Hash);
        assert!(matches!(failure.error, IngestError::Unreadable(_)));
        assert_eq!(failure.error.kind(), "ReadError");
        assert!(fx.record("fileA.txt").await.is_none());
    }

    #[tokio::test]
    async fn copy_failure_leaves_raw_record_at_source() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 100).await;
        fx.objects.fail_copy.store(true, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Relocate);
        assert_eq!(failure.error.kind(), "CopyFailed");
        assert!(failure.left_raw_record());

        let record = fx.record("fileA.txt").await.unwrap();
        assert_eq!(record.status, FileStatus::Raw);
        assert_eq!(record.location, Fixture::raw("fileA.txt"));
        assert!(!fx.objects.exists(&Fixture::processed("fileA.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_failure_is_reported_distinctly() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 100).await;
        fx.objects.fail_delete.store(true, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Relocate);
        assert_eq!(failure.error.kind(), "DeleteFailed");
        assert!(fx.objects.exists(&Fixture::raw("fileA.txt")).await.unwrap());
        assert!(fx.objects.exists(&Fixture::processed("fileA.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn finalize_failure_leaves_raw_record_at_source() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 100).await;
        fx.records.fail_finalize.store(true, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Finalize);
        assert_eq!(failure.error.kind(), "PersistenceError");
        assert_eq!(failure.record_id, Some(FileId::from_key("fileA.txt")));

        let record = fx.record("fileA.txt").await.unwrap();
        assert_eq!(record.status, FileStatus::Raw);
        assert_eq!(record.location, Fixture::raw("fileA.txt"));
        assert!(fx.objects.exists(&Fixture::processed("fileA.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let config = IngestConfig {
            step_timeout_ms: 20,
            ..Default::default()
        };
        let fx = Fixture::new(config);
        fx.upload("fileA.txt", 10).await;
        fx.objects.head_delay_ms.store(500, Ordering::SeqCst);

        let failure = fx.pipeline.process(&event("fileA.txt")).await.unwrap_err();
        assert_eq!(failure.step, Step::Head);
        assert!(matches!(
            failure.error,
            IngestError::Timeout {
                step: Step::Head,
                after
            } if after == Duration::from_millis(20)
        ));
    }

    #[tokio::test]
    async fn blank_content_type_is_defaulted() {
        let fx = Fixture::new(IngestConfig::default());
        fx.objects
            .put(&Fixture::raw("blob"), Bytes::from_static(b"\x00\x01"), "")
            .await
            .unwrap();
        let outcome = fx.pipeline.process(&event("blob")).await.unwrap();
        assert_eq!(outcome.record().unwrap().content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn declared_size_mismatch_still_processes() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 10).await;
        let outcome = fx
            .pipeline
            .process(&event("fileA.txt").with_size(999).with_entity_tag("\"stale\""))
            .await
            .unwrap();
        assert_eq!(outcome.record().unwrap().size, 10);
    }

    #[tokio::test]
    async fn blake3_checksums_when_configured() {
        let config = IngestConfig {
            digest_algorithm: DigestAlgorithm::Blake3,
            ..Default::default()
        };
        let fx = Fixture::new(config);
        let meta = fx.upload("fileA.txt", 300).await;
        let outcome = fx.pipeline.process(&event("fileA.txt")).await.unwrap();
        let record = outcome.record().unwrap();
        // Entity tags are a BLAKE3 prefix, so the checksum must extend it.
        assert!(record.checksum.starts_with(&meta.entity_tag));
    }

    #[tokio::test]
    async fn envelope_entries_are_independent() {
        let fx = Fixture::new(IngestConfig::default());
        fx.upload("fileA.txt", 10).await;
        fx.upload("my report.txt", 10).await;
        let envelope = NotificationEnvelope::from_json(
            r#"{"Records":[
                {"s3":{"bucket":{"name":"ingestor-raw"},"object":{"key":"missing.txt"}}},
                {"s3":{"bucket":{"name":"ingestor-raw"},"object":{"key":"fileA.txt"}}},
                {"s3":{"bucket":{"name":"ingestor-raw"},"object":{"key":"my+report.txt"}}},
                {"s3":{"bucket":{"name":"ingestor-raw"},"object":{"key":"dir/"}}}
            ]}"#,
        )
        .unwrap();

        let results = fx.pipeline.process_envelope(&envelope).await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_err());
        assert!(results[1].as_ref().unwrap().is_processed());
        assert!(results[2].as_ref().unwrap().is_processed());
        assert!(matches!(results[3], Ok(IngestOutcome::Skipped { .. })));
        assert!(fx.record("my report.txt").await.is_some());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = IngestConfig {
            chunk_size: 0,
            ..Default::default()
        };
        let objects = Arc::new(ingestor_store::InMemoryObjectStore::new());
        let records = Arc::new(ingestor_records::InMemoryRecordStore::new());
        assert!(matches!(
            IngestPipeline::new(objects, records, config),
            Err(IngestError::Config(_))
        ));
    }
}
