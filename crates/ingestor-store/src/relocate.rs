//! Copy-then-delete relocation between two object locations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ingestor_types::{Location, ObjectMeta};

use crate::traits::ObjectStore;

/// Errors from a relocation.
///
/// The variants split on one question: is the source still the only copy?
/// Everything except [`RelocateError::DeleteFailed`] leaves the source
/// untouched and is safe to retry from scratch.
#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    /// The copy could not be made or confirmed. Source unaffected.
    #[error("copy {source_location} -> {dest} failed: {reason}")]
    CopyFailed {
        source_location: Location,
        dest: Location,
        reason: String,
    },

    /// The destination already holds different content. Source unaffected.
    #[error("destination {dest} already holds different content")]
    DestinationConflict { dest: Location },

    /// The copy is confirmed but the source could not be removed: the object
    /// now exists at both locations.
    #[error("copied to {dest} but deleting {source_location} failed: {reason}")]
    DeleteFailed {
        source_location: Location,
        dest: Location,
        reason: String,
    },
}

impl RelocateError {
    /// Returns `true` if the object is now present at both locations.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::DeleteFailed { .. })
    }
}

/// What a successful relocation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub source: Location,
    pub dest: Location,
    /// Metadata of the object at its destination.
    pub meta: ObjectMeta,
    /// `false` when the destination already held the same content and the
    /// copy was skipped.
    pub copied: bool,
}

/// Moves objects with copy, confirm, delete.
#[derive(Clone)]
pub struct Relocator {
    store: Arc<dyn ObjectStore>,
}

impl Relocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Move the object at `source` to `dest`.
    ///
    /// On `Ok`, the object is reachable at `dest` and absent at `source`.
    /// A destination already holding the same content (equal size and
    /// entity tag) is accepted without copying again, which makes a retried
    /// relocation after a crash converge.
    pub async fn relocate(
        &self,
        source: &Location,
        dest: &Location,
    ) -> Result<Relocation, RelocateError> {
        let copy_failed = |reason: String| RelocateError::CopyFailed {
            source_location: source.clone(),
            dest: dest.clone(),
            reason,
        };

        let source_meta = self
            .store
            .head(source)
            .await
            .map_err(|e| copy_failed(e.to_string()))?
            .ok_or_else(|| copy_failed("source object missing".into()))?;

        let existing = self
            .store
            .head(dest)
            .await
            .map_err(|e| copy_failed(e.to_string()))?;

        let copied = match existing {
            Some(meta) if meta.same_content(&source_meta) => {
                debug!(%source, %dest, "destination already holds this content, skipping copy");
                false
            }
            Some(_) => {
                return Err(RelocateError::DestinationConflict { dest: dest.clone() });
            }
            None => {
                self.store
                    .copy(source, dest)
                    .await
                    .map_err(|e| copy_failed(e.to_string()))?;
                true
            }
        };

        let meta = self.confirm(source, dest, &source_meta).await?;

        self.store
            .delete(source)
            .await
            .map_err(|e| RelocateError::DeleteFailed {
                source_location: source.clone(),
                dest: dest.clone(),
                reason: e.to_string(),
            })?;

        info!(%source, %dest, copied, "object relocated");
        Ok(Relocation {
            source: source.clone(),
            dest: dest.clone(),
            meta,
            copied,
        })
    }

    /// Finish a relocation that failed with [`RelocateError::DeleteFailed`].
    ///
    /// Confirms `dest` is reachable and deletes `source` without copying
    /// again. If the source is already gone this is a no-op.
    pub async fn complete_delete(
        &self,
        source: &Location,
        dest: &Location,
    ) -> Result<ObjectMeta, RelocateError> {
        let meta = self
            .store
            .head(dest)
            .await
            .map_err(|e| RelocateError::CopyFailed {
                source_location: source.clone(),
                dest: dest.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| RelocateError::CopyFailed {
                source_location: source.clone(),
                dest: dest.clone(),
                reason: "destination object missing".into(),
            })?;

        self.store
            .delete(source)
            .await
            .map_err(|e| RelocateError::DeleteFailed {
                source_location: source.clone(),
                dest: dest.clone(),
                reason: e.to_string(),
            })?;
        info!(%source, %dest, "completed pending source delete");
        Ok(meta)
    }

    /// Reachability check on the destination after a copy.
    async fn confirm(
        &self,
        source: &Location,
        dest: &Location,
        expected: &ObjectMeta,
    ) -> Result<ObjectMeta, RelocateError> {
        let copy_failed = |reason: String| RelocateError::CopyFailed {
            source_location: source.clone(),
            dest: dest.clone(),
            reason,
        };
        match self.store.head(dest).await {
            Ok(Some(meta)) if meta.same_content(expected) => Ok(meta),
            Ok(Some(meta)) => {
                warn!(%dest, expected = %expected.entity_tag, actual = %meta.entity_tag, "copy content mismatch");
                Err(copy_failed("destination content does not match source".into()))
            }
            Ok(None) => Err(copy_failed("copy not visible at destination".into())),
            Err(e) => Err(copy_failed(e.to_string())),
        }
    }
}

impl std::fmt::Debug for Relocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::error::{StoreError, StoreResult};
    use crate::memory::InMemoryObjectStore;
    use crate::traits::ByteStream;

    /// Wraps the in-memory store and fails selected operations on demand.
    #[derive(Default)]
    struct Flaky {
        inner: InMemoryObjectStore,
        fail_copy: AtomicBool,
        fail_delete: AtomicBool,
        drop_copies: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for Flaky {
        async fn head(&self, location: &Location) -> StoreResult<Option<ObjectMeta>> {
            self.inner.head(location).await
        }
        async fn open_read(&self, location: &Location) -> StoreResult<ByteStream> {
            self.inner.open_read(location).await
        }
        async fn copy(&self, source: &Location, dest: &Location) -> StoreResult<()> {
            if self.fail_copy.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("copy refused".into()));
            }
            if self.drop_copies.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.inner.copy(source, dest).await
        }
        async fn delete(&self, location: &Location) -> StoreResult<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("delete refused".into()));
            }
            self.inner.delete(location).await
        }
        async fn put(
            &self,
            location: &Location,
            data: Bytes,
            content_type: &str,
        ) -> StoreResult<ObjectMeta> {
            self.inner.put(location, data, content_type).await
        }
    }

    fn src() -> Location {
        Location::new("raw", "fileA.txt")
    }

    fn dst() -> Location {
        Location::new("processed", "processed/fileA.txt")
    }

    async fn setup() -> (Arc<Flaky>, Relocator) {
        let store = Arc::new(Flaky::default());
        store
            .put(&src(), Bytes::from_static(b"payload"), "text/plain")
            .await
            .unwrap();
        let relocator = Relocator::new(store.clone());
        (store, relocator)
    }

    #[tokio::test]
    async fn moves_object() {
        let (store, relocator) = setup().await;
        let moved = relocator.relocate(&src(), &dst()).await.unwrap();
        assert!(moved.copied);
        assert_eq!(moved.meta.size, 7);
        assert!(!store.exists(&src()).await.unwrap());
        assert!(store.exists(&dst()).await.unwrap());
    }

    #[tokio::test]
    async fn copy_failure_leaves_source() {
        let (store, relocator) = setup().await;
        store.fail_copy.store(true, Ordering::SeqCst);
        let err = relocator.relocate(&src(), &dst()).await.unwrap_err();
        assert!(matches!(err, RelocateError::CopyFailed { .. }));
        assert!(!err.is_partial());
        assert!(store.exists(&src()).await.unwrap());
        assert!(!store.exists(&dst()).await.unwrap());
    }

    #[tokio::test]
    async fn never_deletes_an_unconfirmed_copy() {
        let (store, relocator) = setup().await;
        store.drop_copies.store(true, Ordering::SeqCst);
        let err = relocator.relocate(&src(), &dst()).await.unwrap_err();
        assert!(err.to_string().contains("not visible"));
        assert!(store.exists(&src()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_failure_is_partial() {
        let (store, relocator) = setup().await;
        store.fail_delete.store(true, Ordering::SeqCst);
        let err = relocator.relocate(&src(), &dst()).await.unwrap_err();
        assert!(err.is_partial());
        assert!(store.exists(&src()).await.unwrap());
        assert!(store.exists(&dst()).await.unwrap());

        store.fail_delete.store(false, Ordering::SeqCst);
        store.fail_copy.store(true, Ordering::SeqCst);
        relocator.complete_delete(&src(), &dst()).await.unwrap();
        assert!(!store.exists(&src()).await.unwrap());
        assert!(store.exists(&dst()).await.unwrap());
    }

    #[tokio::test]
    async fn retry_after_partial_skips_copy() {
        let (store, relocator) = setup().await;
        store.fail_delete.store(true, Ordering::SeqCst);
        relocator.relocate(&src(), &dst()).await.unwrap_err();

        store.fail_delete.store(false, Ordering::SeqCst);
        let moved = relocator.relocate(&src(), &dst()).await.unwrap();
        assert!(!moved.copied);
        assert!(!store.exists(&src()).await.unwrap());
    }

    #[tokio::test]
    async fn conflicting_destination_rejected() {
        let (store, relocator) = setup().await;
        store
            .put(&dst(), Bytes::from_static(b"something else"), "text/plain")
            .await
            .unwrap();
        let err = relocator.relocate(&src(), &dst()).await.unwrap_err();
        assert!(matches!(err, RelocateError::DestinationConflict { .. }));
        assert!(store.exists(&src()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_source_is_copy_failure() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let err = Relocator::new(store).relocate(&src(), &dst()).await.unwrap_err();
        assert!(matches!(err, RelocateError::CopyFailed { .. }));
    }

    #[tokio::test]
    async fn complete_delete_requires_destination() {
        let (_store, relocator) = setup().await;
        let err = relocator.complete_delete(&src(), &dst()).await.unwrap_err();
        assert!(matches!(err, RelocateError::CopyFailed { .. }));
    }
}
