use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use ingestor_types::{Location, ObjectMeta};

use crate::error::StoreResult;

/// Readable object content.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Storage interface for key-addressed binary objects.
///
/// Implementations must be safe for concurrent use from many tasks. Every
/// method is a bounded I/O call; callers impose their own timeouts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata for the object at `location`.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    async fn head(&self, location: &Location) -> StoreResult<Option<ObjectMeta>>;

    /// Open the object's content for streaming.
    ///
    /// Returns `Err(StoreError::NotFound)` if the object does not exist.
    async fn open_read(&self, location: &Location) -> StoreResult<ByteStream>;

    /// Copy an object, overwriting anything at `dest`.
    ///
    /// Returns `Err(StoreError::NotFound)` if `source` does not exist.
    async fn copy(&self, source: &Location, dest: &Location) -> StoreResult<()>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, location: &Location) -> StoreResult<()>;

    /// Write an object and return its metadata.
    async fn put(
        &self,
        location: &Location,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<ObjectMeta>;

    /// Check whether an object exists.
    ///
    /// Default implementation calls `head()`.
    async fn exists(&self, location: &Location) -> StoreResult<bool> {
        Ok(self.head(location).await?.is_some())
    }
}
