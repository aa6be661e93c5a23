use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ingestor_digest::{DigestAlgorithm, DigestComputer, DEFAULT_CHUNK_SIZE};
use ingestor_types::{Location, DEFAULT_DELIMITER};

use crate::error::IngestError;

/// Environment variable overriding [`IngestConfig::raw_container`].
pub const ENV_RAW_CONTAINER: &str = "INGESTOR_RAW_CONTAINER";
/// Environment variable overriding [`IngestConfig::processed_container`].
pub const ENV_PROCESSED_CONTAINER: &str = "INGESTOR_PROCESSED_CONTAINER";

/// Configuration for the ingestion pipeline and the reconciler.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Container uploads land in.
    pub raw_container: String,
    /// Container processed objects move to.
    pub processed_container: String,
    /// Prefix prepended to the key in the processed container.
    pub processed_prefix: String,
    /// Store path delimiter; keys ending in it are directory markers.
    pub delimiter: char,
    /// Read size for streaming digests, in bytes.
    pub chunk_size: usize,
    /// Checksum algorithm recorded for every file.
    pub digest_algorithm: DigestAlgorithm,
    /// Upper bound for any single store call, in milliseconds.
    pub step_timeout_ms: u64,
    /// RAW records younger than this are left alone by the reconciler.
    pub reconcile_grace_secs: u64,
    /// Maximum RAW records examined per reconciliation pass.
    pub reconcile_batch_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            raw_container: "ingestor-raw".into(),
            processed_container: "ingestor-processed".into(),
            processed_prefix: "processed/".into(),
            delimiter: DEFAULT_DELIMITER,
            chunk_size: DEFAULT_CHUNK_SIZE,
            digest_algorithm: DigestAlgorithm::Sha256,
            step_timeout_ms: 30_000,
            reconcile_grace_secs: 60,
            reconcile_batch_limit: 100,
        }
    }
}

impl IngestConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, IngestError> {
        toml::from_str(s).map_err(|e| IngestError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_RAW_CONTAINER).filter(|v| !v.is_empty()) {
            self.raw_container = v;
        }
        if let Some(v) = lookup(ENV_PROCESSED_CONTAINER).filter(|v| !v.is_empty()) {
            self.processed_container = v;
        }
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.raw_container.is_empty() || self.processed_container.is_empty() {
            return Err(IngestError::Config("container names must not be empty".into()));
        }
        if self.raw_container == self.processed_container && self.processed_prefix.is_empty() {
            return Err(IngestError::Config(
                "processed location would equal the raw location: set a processed_prefix \
                 or use a different processed_container"
                    .into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(IngestError::Config("chunk_size must be greater than zero".into()));
        }
        if self.step_timeout_ms == 0 {
            return Err(IngestError::Config("step_timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn reconcile_grace(&self) -> Duration {
        Duration::from_secs(self.reconcile_grace_secs)
    }

    /// Where an object at `source` ends up: same key, processed container,
    /// under the processed prefix.
    pub fn processed_location(&self, source: &Location) -> Location {
        source.rebase(&self.processed_container, &self.processed_prefix)
    }

    pub fn digest_computer(&self) -> Result<DigestComputer, IngestError> {
        DigestComputer::new(self.digest_algorithm, self.chunk_size)
            .map_err(|e| IngestError::Config(e.to_string()))
    }
}
