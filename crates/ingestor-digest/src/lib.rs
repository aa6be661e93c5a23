//! Streaming content digests for the ingestor.
//!
//! [`DigestComputer`] reads an async byte stream in fixed-size chunks and
//! feeds each chunk to an incremental hasher, so objects of any size are
//! hashed in constant memory. All hashing wraps established libraries
//! (`sha2`, `blake3`).

pub mod computer;
pub mod error;

pub use computer::{Digest, DigestAlgorithm, DigestComputer, DEFAULT_CHUNK_SIZE};
pub use error::DigestError;
