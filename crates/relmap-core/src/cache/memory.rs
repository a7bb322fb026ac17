use crate::{
    cache::{CacheBackend, CacheKey},
    entity::Entity,
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

// Poisoning is ignored: entries are replaced whole, never partially written.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

///
/// MemoryCache
///
/// In-process result cache holding entity clones.
///

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Entity>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl CacheBackend for MemoryCache {
    fn is_cached(&self, key: &CacheKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    fn load(&self, key: &CacheKey) -> Option<Entity> {
        lock(&self.entries).get(key).cloned()
    }

    fn cache(&self, key: &CacheKey, entity: &Entity) {
        lock(&self.entries).insert(key.clone(), entity.clone());
    }

    fn invalidate(&self, key: &CacheKey) {
        lock(&self.entries).remove(key);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }
}

///
/// EncodedCache
///
/// Result cache storing JSON-encoded entities, the shape of an
/// out-of-process key/value store. Undecodable entries are misses.
///

#[derive(Debug, Default)]
pub struct EncodedCache {
    entries: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl EncodedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under `key`, bypassing encoding.
    pub fn insert_encoded(&self, key: &CacheKey, bytes: Vec<u8>) {
        lock(&self.entries).insert(key.clone(), bytes);
    }

    #[must_use]
    pub fn encoded(&self, key: &CacheKey) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).cloned()
    }
}

impl CacheBackend for EncodedCache {
    fn is_cached(&self, key: &CacheKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    fn load(&self, key: &CacheKey) -> Option<Entity> {
        let bytes = self.encoded(key)?;

        match serde_json::from_slice(&bytes) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::warn!(%key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    fn cache(&self, key: &CacheKey, entity: &Entity) {
        match serde_json::to_vec(entity) {
            Ok(bytes) => {
                lock(&self.entries).insert(key.clone(), bytes);
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "entity not cacheable");
                lock(&self.entries).remove(key);
            }
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        lock(&self.entries).remove(key);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }
}

///
/// NoCache
///
/// Disabled result cache: every probe misses.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl CacheBackend for NoCache {
    fn is_cached(&self, _: &CacheKey) -> bool {
        false
    }

    fn load(&self, _: &CacheKey) -> Option<Entity> {
        None
    }

    fn cache(&self, _: &CacheKey, _: &Entity) {}

    fn invalidate(&self, _: &CacheKey) {}

    fn clear(&self) {}
}
