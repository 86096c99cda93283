//! Storage backend abstraction.
//!
//! A backend is a flat string key/value store partitioned into a fixed set of
//! collections. Records are serialized by [`crate::PluginStore`]; backends
//! never look inside values. Every call is its own atomic unit; callers get
//! no isolation across calls.

use crate::error::{StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Logical collections kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// One settings record per extension id.
    Settings,
    /// One obfuscated credential per provider name.
    Secrets,
    /// Time-boxed cache entries.
    Cache,
    /// Store bookkeeping: loaded-set snapshot, schema version, legacy blob.
    Meta,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Settings,
        Collection::Secrets,
        Collection::Cache,
        Collection::Meta,
    ];

    /// Stable name used as the collection column in SQL backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Secrets => "secrets",
            Self::Cache => "cache",
            Self::Meta => "meta",
        }
    }
}

/// A durable (or, for tests, in-memory) key/value engine.
///
/// Implementations are synchronous; [`crate::PluginStore`] moves calls onto
/// the blocking thread pool.
pub trait StorageBackend: Send + Sync + 'static {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<String>>;

    /// Inserts or replaces a value.
    fn put(&self, collection: Collection, key: &str, value: &str) -> StoreResult<()>;

    /// Removes a key. Returns whether it existed.
    fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool>;

    /// Removes a key only while it still holds `expected`. Returns whether it
    /// was removed; a value replaced since it was read is left alone.
    fn delete_if(&self, collection: Collection, key: &str, expected: &str) -> StoreResult<bool>;

    /// Returns every `(key, value)` pair of a collection, ordered by key.
    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, String)>>;

    /// Empties a collection. Returns the number of removed keys.
    fn clear(&self, collection: Collection) -> StoreResult<usize>;
}

/// In-memory backend used by tests and by hosts that opt out of durability.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<Collection, BTreeMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Collection, BTreeMap<String, String>>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .lock()
            .get(&collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    fn put(&self, collection: Collection, key: &str, value: &str) -> StoreResult<()> {
        self.lock()
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .get_mut(&collection)
            .and_then(|c| c.remove(key))
            .is_some())
    }

    fn delete_if(&self, collection: Collection, key: &str, expected: &str) -> StoreResult<bool> {
        let mut collections = self.lock();
        let Some(entries) = collections.get_mut(&collection) else {
            return Ok(false);
        };
        if entries.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    fn list(&self, collection: Collection) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .lock()
            .get(&collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn clear(&self, collection: Collection) -> StoreResult<usize> {
        Ok(self
            .lock()
            .remove(&collection)
            .map(|c| c.len())
            .unwrap_or(0))
    }
}

/// A backend that fails every call. Lets tests exercise the
/// "persistence unavailable" paths (quota exceeded, disk gone).
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl UnavailableBackend {
    fn fail<T>(&self) -> StoreResult<T> {
        Err(StoreError::Backend("storage unavailable".into()))
    }
}

impl StorageBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn get(&self, _collection: Collection, _key: &str) -> StoreResult<Option<String>> {
        self.fail()
    }

    fn put(&self, _collection: Collection, _key: &str, _value: &str) -> StoreResult<()> {
        self.fail()
    }

    fn delete(&self, _collection: Collection, _key: &str) -> StoreResult<bool> {
        self.fail()
    }

    fn delete_if(&self, _collection: Collection, _key: &str, _expected: &str) -> StoreResult<bool> {
        self.fail()
    }

    fn list(&self, _collection: Collection) -> StoreResult<Vec<(String, String)>> {
        self.fail()
    }

    fn clear(&self, _collection: Collection) -> StoreResult<usize> {
        self.fail()
    }
}
