use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use ingestor_digest::DigestComputer;
use ingestor_types::{Location, ObjectMeta, DEFAULT_CONTENT_TYPE};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ByteStream, ObjectStore};

/// Object store backed by a local directory tree.
///
/// Layout: `<root>/<container>/<key>`. Keys containing `/` become nested
/// directories. The filesystem keeps no per-object metadata, so the content
/// type is inferred from the key's extension (the type passed to `put` is
/// not persisted) and the entity tag is computed from content.
///
/// Computed tags are cached per path and reused while the file's size and
/// modification time are unchanged. `put` and `copy` seed the cache, so a
/// pipeline run hashes each object for its tag at most once.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    tags: Arc<RwLock<HashMap<PathBuf, CachedTag>>>,
}

/// File identity a cached tag was computed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedTag {
    stamp: Stamp,
    tag: String,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tags: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a location onto a path under the root, rejecting traversal.
    fn path_for(&self, location: &Location) -> StoreResult<PathBuf> {
        let invalid = |reason: &str| StoreError::InvalidLocation {
            location: location.clone(),
            reason: reason.to_string(),
        };
        if location.container.is_empty() || location.container.contains(['/', '\\']) {
            return Err(invalid("container must be a single path segment"));
        }
        if location.container == "." || location.container == ".." {
            return Err(invalid("container must not be a relative path segment"));
        }
        let key = Path::new(&location.key);
        if location.key.is_empty()
            || !key.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid("key must be a relative path without '..'"));
        }
        Ok(self.root.join(&location.container).join(key))
    }

    fn cached_tag(&self, path: &Path, stamp: Stamp) -> Option<String> {
        let tags = self.tags.read().ok()?;
        tags.get(path)
            .filter(|cached| cached.stamp == stamp)
            .map(|cached| cached.tag.clone())
    }

    /// Cache misses only cost a rehash, so a poisoned lock is ignored.
    fn remember(&self, path: PathBuf, stamp: Stamp, tag: String) {
        if let Ok(mut tags) = self.tags.write() {
            tags.insert(path, CachedTag { stamp, tag });
        }
    }

    fn forget(&self, path: &Path) {
        if let Ok(mut tags) = self.tags.write() {
            tags.remove(path);
        }
    }

    async fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Best-effort content type from a key's extension.
fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn head(&self, location: &Location) -> StoreResult<Option<ObjectMeta>> {
        let path = self.path_for(location)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stamp = Stamp::of(&metadata);
        let tag = match self.cached_tag(&path, stamp) {
            Some(tag) => tag,
            None => {
                let file = fs::File::open(&path).await?;
                let tag = DigestComputer::blake3()
                    .compute(file, Some(metadata.len()))
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?
                    .entity_tag();
                self.remember(path, stamp, tag.clone());
                tag
            }
        };
        Ok(Some(ObjectMeta::new(
            metadata.len(),
            content_type_for(&location.key),
            tag,
        )))
    }

    async fn open_read(&self, location: &Location) -> StoreResult<ByteStream> {
        let path = self.path_for(location)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(location.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, source: &Location, dest: &Location) -> StoreResult<()> {
        let from = self.path_for(source)?;
        let to = self.path_for(dest)?;
        Self::ensure_parent(&to).await?;
        let source_stamp = match fs::metadata(&from).await {
            Ok(m) => Stamp::of(&m),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(source.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        match fs::copy(&from, &to).await {
            Ok(bytes) => {
                debug!(%source, %dest, bytes, "copied object");
                match self.cached_tag(&from, source_stamp) {
                    Some(tag) => {
                        let stamp = Stamp::of(&fs::metadata(&to).await?);
                        self.remember(to, stamp, tag);
                    }
                    None => self.forget(&to),
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(source.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, location: &Location) -> StoreResult<()> {
        let path = self.path_for(location)?;
        self.forget(&path);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        location: &Location,
        data: Bytes,
        _content_type: &str,
    ) -> StoreResult<ObjectMeta> {
        let path = self.path_for(location)?;
        Self::ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        let tag = DigestComputer::blake3().digest_bytes(&data).entity_tag();
        let stamp = Stamp::of(&fs::metadata(&path).await?);
        self.remember(path, stamp, tag.clone());
        Ok(ObjectMeta::new(
            data.len() as u64,
            content_type_for(&location.key),
            tag,
        ))
    }
}
