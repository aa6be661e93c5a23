use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Path delimiter used by object stores to emulate directories.
pub const DEFAULT_DELIMITER: char = '/';

/// Content type recorded when the store does not report one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Address of an object: a container (bucket) plus a key within it.
///
/// Serializes as two flat fields, `container` and `key`, so that a
/// [`FileRecord`](crate::FileRecord) flattens it into its own mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Container (bucket) identifier.
    pub container: String,
    /// Object key inside the container.
    pub key: String,
}

impl Location {
    /// Create a location from a container and key.
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Returns `true` if the key denotes a directory marker rather than a file.
    pub fn is_directory_marker(&self, delimiter: char) -> bool {
        self.key.is_empty() || self.key.ends_with(delimiter)
    }

    /// The same key re-rooted in another container under `prefix`.
    ///
    /// `prefix` is used verbatim, so callers include the trailing delimiter
    /// (`"processed/"`). An empty prefix keeps the key unchanged.
    pub fn rebase(&self, container: &str, prefix: &str) -> Self {
        Self::new(container, format!("{prefix}{}", self.key))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

impl FromStr for Location {
    type Err = TypeError;

    /// Parse `container/key`. The split happens at the first `/`, so keys
    /// may contain further delimiters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (container, key) = s
            .split_once(DEFAULT_DELIMITER)
            .ok_or_else(|| TypeError::InvalidLocation(format!("missing '/' in {s:?}")))?;
        if container.is_empty() || key.is_empty() {
            return Err(TypeError::InvalidLocation(format!(
                "empty container or key in {s:?}"
            )));
        }
        Ok(Self::new(container, key))
    }
}

/// Store-assigned metadata for one object, as returned by a head request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Content length in bytes.
    pub size: u64,
    /// MIME type reported by the store.
    pub content_type: String,
    /// Opaque entity tag. Stores derive it from content, so a copy keeps it.
    pub entity_tag: String,
}

impl ObjectMeta {
    /// Build metadata, substituting [`DEFAULT_CONTENT_TYPE`] for a blank type.
    pub fn new(size: u64, content_type: impl Into<String>, entity_tag: impl Into<String>) -> Self {
        let content_type = content_type.into();
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            content_type
        };
        Self {
            size,
            content_type,
            entity_tag: entity_tag.into().trim_matches('"').to_string(),
        }
    }

    /// Returns `true` if both describe the same content.
    pub fn same_content(&self, other: &Self) -> bool {
        self.size == other.size && self.entity_tag == other.entity_tag
    }
}
