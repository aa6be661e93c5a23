//! Foundation types for the ingestor.
//!
//! Every other ingestor crate depends on `ingestor-types`. The types here are
//! plain data: they carry no I/O and no store-specific behavior.
//!
//! # Key Types
//!
//! - [`Location`] -- `(container, key)` address of an object in an object store
//! - [`ObjectMeta`] -- store-assigned metadata returned by a head request
//! - [`FileId`] -- primary key of a file record, derived from the object key
//! - [`FileStatus`] -- lifecycle state: `RAW`, `PROCESSED`, `FAILED`
//! - [`FileRecord`] -- the metadata record kept for every ingested object

pub mod error;
pub mod location;
pub mod record;

pub use error::TypeError;
pub use location::{Location, ObjectMeta, DEFAULT_CONTENT_TYPE, DEFAULT_DELIMITER};
pub use record::{FileId, FileRecord, FileStatus};
