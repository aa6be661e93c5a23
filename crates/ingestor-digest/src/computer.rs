use std::fmt;
use std::io::ErrorKind;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::error::DigestError;

/// Chunk size used when none is configured (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Hex characters kept from a BLAKE3 digest for an entity tag (128 bits).
const ENTITY_TAG_HEX_LEN: usize = 32;

// ---------------------------------------------------------------------------
// DigestAlgorithm
// ---------------------------------------------------------------------------

/// Hash function used for content checksums.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        64
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(DigestError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Incremental hasher state for one computation.
enum Accumulator {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Accumulator {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(chunk),
            Self::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// A finished content digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex encoding of the hash.
    pub hex: String,
    /// Number of bytes consumed from the input.
    pub bytes_read: u64,
}

impl Digest {
    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> &str {
        &self.hex[..8.min(self.hex.len())]
    }

    /// Entity tag form: the first 128 bits of the hex digest.
    pub fn entity_tag(&self) -> String {
        self.hex[..ENTITY_TAG_HEX_LEN.min(self.hex.len())].to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

// ---------------------------------------------------------------------------
// DigestComputer
// ---------------------------------------------------------------------------

/// Computes content digests over async byte streams in bounded chunks.
///
/// Memory use is one chunk buffer regardless of object size. The computer
/// does not retry: a failing stream surfaces as [`DigestError::Read`] and the
/// caller decides what to do.
#[derive(Clone, Debug)]
pub struct DigestComputer {
    algorithm: DigestAlgorithm,
    chunk_size: usize,
}

impl DigestComputer {
    /// Create a computer with an explicit algorithm and chunk size.
    pub fn new(algorithm: DigestAlgorithm, chunk_size: usize) -> Result<Self, DigestError> {
        if chunk_size == 0 {
            return Err(DigestError::ZeroChunkSize);
        }
        Ok(Self {
            algorithm,
            chunk_size,
        })
    }

    /// SHA-256 with the default 4 KiB chunk size.
    pub fn sha256() -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// BLAKE3 with the default 4 KiB chunk size.
    pub fn blake3() -> Self {
        Self {
            algorithm: DigestAlgorithm::Blake3,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash `reader` to exhaustion.
    ///
    /// `declared_size` is only compared against the byte count afterwards; a
    /// mismatch is logged, never treated as an error.
    pub async fn compute<R>(
        &self,
        mut reader: R,
        declared_size: Option<u64>,
    ) -> Result<Digest, DigestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut acc = Accumulator::new(self.algorithm);
        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes_read: u64 = 0;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(DigestError::Read { bytes_read, source }),
            };
            acc.update(&buf[..n]);
            bytes_read += n as u64;
        }

        if let Some(expected) = declared_size {
            if expected != bytes_read {
                warn!(
                    expected,
                    actual = bytes_read,
                    "stream length differs from declared size"
                );
            }
        }

        let digest = Digest {
            algorithm: self.algorithm,
            hex: acc.finalize_hex(),
            bytes_read,
        };
        debug!(algorithm = %digest.algorithm, bytes = bytes_read, digest = digest.short_hex(), "digest computed");
        Ok(digest)
    }

    /// One-shot digest of an in-memory buffer.
    pub fn digest_bytes(&self, data: &[u8]) -> Digest {
        let mut acc = Accumulator::new(self.algorithm);
        acc.update(data);
        Digest {
            algorithm: self.algorithm,
            hex: acc.finalize_hex(),
            bytes_read: data.len() as u64,
        }
    }
}

impl Default for DigestComputer {
    fn default() -> Self {
        Self::sha256()
    }
}
