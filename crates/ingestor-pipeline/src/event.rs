//! Inbound object-created notifications.
//!
//! [`ObjectCreatedEvent`] is the pipeline's own event shape. A
//! [`NotificationEnvelope`] wraps the batched form object stores deliver,
//! where keys arrive form-encoded and must be decoded before use.

use serde::{Deserialize, Serialize};

use ingestor_types::Location;

use crate::error::IngestError;

/// A single "object created" notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatedEvent {
    pub container: String,
    pub key: String,
    /// Size as reported by the notifier. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Entity tag as reported by the notifier. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_tag: Option<String>,
}

impl ObjectCreatedEvent {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            size: None,
            entity_tag: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_entity_tag(mut self, tag: impl Into<String>) -> Self {
        self.entity_tag = Some(tag.into());
        self
    }

    pub fn location(&self) -> Location {
        Location::new(self.container.clone(), self.key.clone())
    }
}

// ---------------------------------------------------------------------------
// Notification envelope
// ---------------------------------------------------------------------------

/// Batched notification in the S3 event layout:
/// `{"Records":[{"s3":{"bucket":{"name":..},"object":{"key":..,"size":..,"eTag":..}}}]}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub s3: NotificationEntity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationEntity {
    pub bucket: NotificationBucket,
    pub object: NotificationObject,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationBucket {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationObject {
    /// Form-encoded key: `+` stands for a space, other bytes are `%XX`.
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "eTag", default)]
    pub e_tag: Option<String>,
}

impl NotificationEnvelope {
    pub fn from_json(text: &str) -> Result<Self, IngestError> {
        serde_json::from_str(text)
            .map_err(|e| IngestError::InvalidEvent(format!("malformed notification: {e}")))
    }

    /// One event per entry, in delivery order, with keys decoded.
    pub fn events(&self) -> Result<Vec<ObjectCreatedEvent>, IngestError> {
        self.records
            .iter()
            .map(|record| {
                let object = &record.s3.object;
                let key = decode_key(&object.key)?;
                let mut event = ObjectCreatedEvent::new(record.s3.bucket.name.clone(), key);
                event.size = object.size;
                event.entity_tag = object.e_tag.clone();
                Ok(event)
            })
            .collect()
    }
}

/// Decode a form-encoded object key.
pub fn decode_key(raw: &str) -> Result<String, IngestError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| IngestError::InvalidEvent(format!("undecodable key {raw:?}: {e}")))
}
