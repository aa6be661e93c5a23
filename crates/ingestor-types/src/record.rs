use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::location::{Location, ObjectMeta};

/// Prefix that turns an object key into a record id.
const FILE_ID_PREFIX: &str = "file#";

// ---------------------------------------------------------------------------
// FileId
// ---------------------------------------------------------------------------

/// Primary key of a [`FileRecord`]: `file#<object key>`.
///
/// Derived from the key of the object in the raw container, so two deliveries
/// of the same object-created event map to the same record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Derive the id for an object key.
    pub fn from_key(key: &str) -> Self {
        Self(format!("{FILE_ID_PREFIX}{key}"))
    }

    /// Parse user input: either a full `file#...` id or a bare key.
    ///
    /// Bare keys may arrive percent-encoded (for example from a URL path
    /// segment) and are decoded before the prefix is applied.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        if input.starts_with(FILE_ID_PREFIX) {
            if input.len() == FILE_ID_PREFIX.len() {
                return Err(TypeError::InvalidFileId(input.to_string()));
            }
            return Ok(Self(input.to_string()));
        }
        let key = urlencoding::decode(input)
            .map_err(|e| TypeError::InvalidFileId(format!("{input}: {e}")))?;
        if key.is_empty() {
            return Err(TypeError::InvalidFileId(input.to_string()));
        }
        Ok(Self::from_key(&key))
    }

    /// The object key this id was derived from.
    pub fn key(&self) -> &str {
        self.0.strip_prefix(FILE_ID_PREFIX).unwrap_or(&self.0)
    }

    /// The full id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FileStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a file record.
///
/// Transitions are monotonic: `RAW -> PROCESSED` or `RAW -> FAILED`. Nothing
/// ever returns to `RAW`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    /// Recorded in the raw container; relocation not yet confirmed.
    Raw,
    /// Relocated to the processed container and finalized.
    Processed,
    /// Abandoned after an unrecoverable error.
    Failed,
}

impl FileStatus {
    /// Returns `true` for `PROCESSED` and `FAILED`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    /// Returns `true` if a record in `self` may move to `next`.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (Self::Raw, Self::Processed) | (Self::Raw, Self::Failed)
        )
    }

    /// Wire name: `RAW`, `PROCESSED` or `FAILED`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "RAW",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RAW" => Ok(Self::Raw),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(TypeError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// Lifecycle metadata kept for one ingested object.
///
/// `checksum`, `size`, `content_type` and `entity_tag` are fixed at creation.
/// `location` changes exactly once, when the record is finalized, and always
/// matches `status`: the raw location while `RAW`, the processed location
/// once `PROCESSED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    #[serde(flatten)]
    pub location: Location,
    pub size: u64,
    pub content_type: String,
    pub entity_tag: String,
    /// Hex-encoded content digest.
    pub checksum: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl FileRecord {
    /// A fresh `RAW` record for an object at `location`.
    pub fn raw(
        location: Location,
        meta: &ObjectMeta,
        checksum: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FileId::from_key(&location.key),
            location,
            size: meta.size,
            content_type: meta.content_type.clone(),
            entity_tag: meta.entity_tag.clone(),
            checksum: checksum.into(),
            status: FileStatus::Raw,
            created_at,
            processed_at: None,
            failure_reason: None,
        }
    }

    /// Returns `true` unless the record is `FAILED`.
    ///
    /// Only active records block the creation of a new record with the same id.
    pub fn is_active(&self) -> bool {
        self.status != FileStatus::Failed
    }

    /// Returns `true` if `processed_at` is set and lies in the inclusive
    /// range. A missing bound leaves that side open.
    pub fn processed_within(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(at) = self.processed_at else {
            return false;
        };
        from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
    }

    /// Metadata view used to compare the record against a store head.
    pub fn object_meta(&self) -> ObjectMeta {
        ObjectMeta {
            size: self.size,
            content_type: self.content_type.clone(),
            entity_tag: self.entity_tag.clone(),
        }
    }
}
