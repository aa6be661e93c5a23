use std::time::Duration;

use serde::Serialize;

use ingestor_types::{FileId, FileRecord, Location};

use crate::error::Step;

/// Wall-clock time spent in one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StepTiming {
    pub step: Step,
    pub elapsed: Duration,
}

/// Successful result of processing one event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The event named something that is not a file; nothing was done.
    Skipped { location: Location, reason: String },
    /// Another delivery of the same event already owns the record.
    Duplicate { id: FileId },
    /// The object was hashed, recorded, relocated and finalized.
    Processed {
        record: FileRecord,
        timings: Vec<StepTiming>,
    },
}

impl IngestOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }

    /// The finalized record, if this event produced one.
    pub fn record(&self) -> Option<&FileRecord> {
        match self {
            Self::Processed { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Duplicate { .. } => "duplicate",
            Self::Processed { .. } => "processed",
        }
    }
}
