use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use ingestor_digest::DigestComputer;
use ingestor_types::{Location, ObjectMeta};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ByteStream, ObjectStore};

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    meta: ObjectMeta,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Reads hand out cheap `Bytes` clones.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Location, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    fn read_map(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<Location, StoredObject>>> {
        self.objects
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_map(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<Location, StoredObject>>> {
        self.objects
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.read_map().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys of all objects in `container`.
    pub fn keys(&self, container: &str) -> Vec<String> {
        let Ok(map) = self.read_map() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = map
            .keys()
            .filter(|loc| loc.container == container)
            .map(|loc| loc.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Full content of an object, if present.
    pub fn get_bytes(&self, location: &Location) -> Option<Bytes> {
        self.read_map()
            .ok()
            .and_then(|m| m.get(location).map(|o| o.data.clone()))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head(&self, location: &Location) -> StoreResult<Option<ObjectMeta>> {
        Ok(self.read_map()?.get(location).map(|o| o.meta.clone()))
    }

    async fn open_read(&self, location: &Location) -> StoreResult<ByteStream> {
        let data = self
            .read_map()?
            .get(location)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(location.clone()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn copy(&self, source: &Location, dest: &Location) -> StoreResult<()> {
        let mut map = self.write_map()?;
        let object = map
            .get(source)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source.clone()))?;
        map.insert(dest.clone(), object);
        Ok(())
    }

    async fn delete(&self, location: &Location) -> StoreResult<()> {
        self.write_map()?.remove(location);
        Ok(())
    }

    async fn put(
        &self,
        location: &Location,
        data: Bytes,
        content_type: &str,
    ) -> StoreResult<ObjectMeta> {
        let tag = DigestComputer::blake3().digest_bytes(&data).entity_tag();
        let meta = ObjectMeta::new(data.len() as u64, content_type, tag);
        self.write_map()?.insert(
            location.clone(),
            StoredObject {
                data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}
