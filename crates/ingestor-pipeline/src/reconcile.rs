//! Out-of-band repair of records a pipeline run left in RAW.
//!
//! A RAW record older than the grace period belongs to a run that failed
//! after step 3. Where the object actually is decides the repair:
//!
//! | source  | destination | repair                                     |
//! |---------|-------------|--------------------------------------------|
//! | present | absent      | relocate, then finalize                    |
//! | absent  | present     | finalize                                   |
//! | present | present     | delete the source without copying, finalize |
//! | absent  | absent      | mark FAILED                                |
//!
//! The stored checksum is reused in every case; objects are never rehashed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use ingestor_records::{RecordStore, ScanFilter};
use ingestor_store::{ObjectStore, Relocator};
use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::config::IngestConfig;
use crate::error::{IngestError, Step};
use crate::pipeline::bounded;

/// Reason recorded on records whose object cannot be found anywhere.
pub const MISSING_OBJECT_REASON: &str = "object missing from both locations";

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Relocated from the source, then finalized.
    Resumed,
    /// Already at the destination; only the record was updated.
    Finalized,
    /// Present at both locations; the source copy was deleted.
    CompletedDelete,
    MarkedFailed,
    /// Another writer finalized the record first.
    RaceLost,
    /// The destination holds different content. Left untouched.
    Conflict,
    /// A store call failed; the record stays RAW for the next pass.
    Error,
}

impl ActionKind {
    /// Returns `true` for outcomes that need an operator's attention.
    pub fn is_issue(&self) -> bool {
        matches!(self, Self::Conflict | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resumed => "resumed",
            Self::Finalized => "finalized",
            Self::CompletedDelete => "completed_delete",
            Self::MarkedFailed => "marked_failed",
            Self::RaceLost => "race_lost",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the reconciler did with one record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileAction {
    pub id: FileId,
    pub kind: ActionKind,
    pub detail: String,
}

/// Result of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked_at: DateTime<Utc>,
    /// RAW records older than the grace period returned by the scan.
    pub examined: usize,
    pub actions: Vec<ReconcileAction>,
}

impl ReconcileReport {
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    pub fn has_issues(&self) -> bool {
        self.actions.iter().any(|a| a.kind.is_issue())
    }

    /// Actions that need attention.
    pub fn issues(&self) -> impl Iterator<Item = &ReconcileAction> {
        self.actions.iter().filter(|a| a.kind.is_issue())
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Finds RAW records older than the grace period and drives each to a
/// terminal state.
pub struct Reconciler {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    relocator: Relocator,
    config: IngestConfig,
}

impl Reconciler {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        config: IngestConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            relocator: Relocator::new(objects.clone()),
            objects,
            records,
            config,
        })
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, IngestError> {
        self.reconcile_at(Utc::now()).await
    }

    /// Run one pass as if the current time were `now`.
    ///
    /// Only the scan itself can fail the pass. Per-record failures are
    /// reported as [`ActionKind::Error`] and the pass moves on.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, IngestError> {
        let grace = chrono::Duration::from_std(self.config.reconcile_grace())
            .map_err(|e| IngestError::Config(format!("reconcile grace out of range: {e}")))?;
        let cutoff = now - grace;

        let filter = ScanFilter::all()
            .with_status(FileStatus::Raw)
            .created_before(cutoff)
            .with_limit(self.config.reconcile_batch_limit);
        let pending = self.bounded(Step::Record, self.records.scan(&filter)).await?;

        let mut report = ReconcileReport {
            checked_at: now,
            examined: pending.len(),
            actions: Vec::new(),
        };

        for record in &pending {
            let action = match self.repair(record).await {
                Ok((kind, detail)) => ReconcileAction {
                    id: record.id.clone(),
                    kind,
                    detail,
                },
                Err(IngestError::PreconditionFailed(e)) => ReconcileAction {
                    id: record.id.clone(),
                    kind: ActionKind::RaceLost,
                    detail: e.to_string(),
                },
                Err(e) => ReconcileAction {
                    id: record.id.clone(),
                    kind: ActionKind::Error,
                    detail: format!("{}: {e}", e.kind()),
                },
            };
            if action.kind.is_issue() {
                warn!(id = %action.id, kind = %action.kind, detail = %action.detail, "reconciliation issue");
            } else {
                info!(id = %action.id, kind = %action.kind, "record reconciled");
            }
            report.actions.push(action);
        }

        info!(
            examined = report.examined,
            repaired = report.actions.len(),
            issues = report.has_issues(),
            "reconciliation pass complete"
        );
        Ok(report)
    }

    async fn repair(&self, record: &FileRecord) -> Result<(ActionKind, String), IngestError> {
        let source = &record.location;
        let dest = self.config.processed_location(source);
        let expected = record.object_meta();

        let at_source = self.bounded(Step::Head, self.objects.head(source)).await?;
        let at_dest = self.bounded(Step::Head, self.objects.head(&dest)).await?;

        if let Some(found) = &at_dest {
            if !found.same_content(&expected) {
                return Ok((
                    ActionKind::Conflict,
                    format!(
                        "{dest} holds {} bytes tagged {}, record expects {} bytes tagged {}",
                        found.size, found.entity_tag, expected.size, expected.entity_tag
                    ),
                ));
            }
        }

        match (at_source.is_some(), at_dest.is_some()) {
            (true, false) => {
                self.bounded(Step::Relocate, self.relocator.relocate(source, &dest))
                    .await?;
                self.finalize(&record.id, &dest).await?;
                Ok((ActionKind::Resumed, format!("relocated to {dest}")))
            }
            (false, true) => {
                self.finalize(&record.id, &dest).await?;
                Ok((ActionKind::Finalized, format!("found at {dest}")))
            }
            (true, true) => {
                self.bounded(Step::Relocate, self.relocator.complete_delete(source, &dest))
                    .await?;
                self.finalize(&record.id, &dest).await?;
                Ok((ActionKind::CompletedDelete, format!("removed {source}")))
            }
            (false, false) => {
                self.bounded(
                    Step::Finalize,
                    self.records.mark_failed(&record.id, MISSING_OBJECT_REASON),
                )
                .await?;
                Ok((ActionKind::MarkedFailed, MISSING_OBJECT_REASON.to_string()))
            }
        }
    }

    async fn finalize(&self, id: &FileId, dest: &Location) -> Result<FileRecord, IngestError> {
        self.bounded(
            Step::Finalize,
            self.records
                .finalize(id, dest.clone(), FileStatus::Processed, Utc::now()),
        )
        .await
    }

    async fn bounded<T, E>(
        &self,
        step: Step,
        fut: impl std::future::Future<Output = Result<T, E>>,
    ) -> Result<T, IngestError>
    where
        E: Into<IngestError>,
    {
        bounded(self.config.step_timeout(), step, fut).await
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
