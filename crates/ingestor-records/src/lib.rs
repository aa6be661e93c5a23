//! File lifecycle records for the ingestor.
//!
//! One [`FileRecord`](ingestor_types::FileRecord) exists per ingested file.
//! The store is the only state shared between concurrent pipeline runs, and
//! its two conditional writes are the concurrency-control boundary:
//!
//! - [`RecordStore::create_raw`] refuses to overwrite an active record, so
//!   of two racing deliveries of one event exactly one proceeds.
//! - [`RecordStore::finalize`] and [`RecordStore::mark_failed`] only apply
//!   to a record that is still RAW, so a record is finalized at most once.
//!
//! # Modules
//!
//! - [`error`] -- Error types for record operations
//! - [`traits`] -- The [`RecordStore`] trait and [`ScanFilter`]
//! - [`table`] -- Transition rules shared by all backends
//! - [`memory`] -- In-memory [`InMemoryRecordStore`] for tests
//! - [`file`] -- [`JsonFileRecordStore`], a single JSON document on disk

pub mod error;
pub mod file;
pub mod memory;
pub mod table;
pub mod traits;

pub use error::{RecordError, Result};
pub use file::JsonFileRecordStore;
pub use memory::InMemoryRecordStore;
pub use table::RecordTable;
pub use traits::{RecordStore, ScanFilter, DEFAULT_SCAN_LIMIT};
