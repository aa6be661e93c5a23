//! Object storage for the ingestor.
//!
//! Objects are addressed by [`Location`](ingestor_types::Location), a
//! `(container, key)` pair. The store never interprets object contents.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- containers are directories under a root path
//!
//! # Relocation
//!
//! [`Relocator`] moves an object between locations with copy, confirm, then
//! delete. It never deletes the source before the copy is visible, and it
//! reports a failed delete distinctly from a failed copy because the object
//! then exists in both places.
//!
//! # Entity Tags
//!
//! Both backends derive the entity tag from content (128-bit BLAKE3 prefix),
//! so a copy keeps the tag of its source.

pub mod error;
pub mod fs;
pub mod memory;
pub mod relocate;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use relocate::{RelocateError, Relocation, Relocator};
pub use traits::{ByteStream, ObjectStore};
