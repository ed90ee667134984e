//! # convex-cache
//!
//! Namespaced key/value caches used by the convex model layer.
//!
//! ## Features
//!
//! - **One cache per model kind**: every cache owns its own in-memory map
//! - **Optional durable mirror**: values can be written through to a
//!   [`DurableStore`] under a per-cache prefix, on request
//! - **Prefix isolation**: clearing a cache never touches durable keys that
//!   belong to other caches or other applications
//! - **No eviction**: entries live until they are removed explicitly
//!
//! ## Quick Start
//!
//! ```rust
//! use convex_cache::{Cache, CacheConfig, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let cache: Cache<String> = Cache::new("users", &CacheConfig::default(), store.clone());
//!
//! cache.put("123", "John Doe".to_string());
//! assert_eq!(cache.get("123"), Some("John Doe".to_string()));
//!
//! // Write through to the durable mirror
//! cache.put_persisted("456", "Jane Doe".to_string()).unwrap();
//! assert!(store.contains("convex-users:456"));
//! ```

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Synchronous string key/value storage that outlives the process.
///
/// Implementations must degrade to no-ops when the underlying storage is
/// unavailable instead of failing, which is why none of the methods return
/// a `Result`.
pub trait DurableStore: Send + Sync {
    /// Store a serialized value
    fn set_item(&self, key: &str, value: &str);

    /// Read a serialized value
    fn get_item(&self, key: &str) -> Option<String>;

    /// Remove a value
    fn remove_item(&self, key: &str);

    /// Enumerate every stored key
    fn keys(&self) -> Vec<String>;

    /// Whether values written here actually survive
    fn is_available(&self) -> bool {
        true
    }
}

/// A namespaced in-memory cache with an optional durable mirror
pub struct Cache<V> {
    name: String,
    prefix: String,
    entries: DashMap<String, V>,
    store: Arc<dyn DurableStore>,
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V: Clone> Cache<V> {
    /// Create a cache named `name`, mirroring into `store` under the configured namespace
    pub fn new(
        name: impl Into<String>,
        config: &CacheConfig,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let name = name.into();
        let prefix = config.prefix_for(&name);
        tracing::debug!("Created cache '{}' (durable prefix: {})", name, prefix);
        Self {
            name,
            prefix,
            entries: DashMap::new(),
            store,
        }
    }

    /// The cache name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix applied to every durable key written by this cache
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Durable key for a cache key
    pub fn durable_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Store a value in memory and return it
    pub fn put(&self, key: impl Into<String>, value: V) -> V {
        self.entries.insert(key.into(), value.clone());
        value
    }

    /// Get a value from memory
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Return the value stored under `key`, registering `init()` first if there is none.
    ///
    /// The lookup and the registration happen under the same shard lock, so
    /// two callers racing on one key always observe the same value. The
    /// boolean is `true` when `init` ran.
    pub fn get_or_insert_with<F>(&self, key: impl Into<String>, init: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        let mut inserted = false;
        let value = self
            .entries
            .entry(key.into())
            .or_insert_with(|| {
                inserted = true;
                init()
            })
            .value()
            .clone();
        (value, inserted)
    }

    /// Check whether a key is present in memory
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a value from memory and from the durable mirror
    pub fn remove(&self, key: &str) -> Option<V> {
        self.store.remove_item(&self.durable_key(key));
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Drop every in-memory entry, leaving the durable mirror untouched
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Clear memory and every durable key under this cache's prefix
    pub fn remove_all(&self) {
        self.entries.clear();

        let owned: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&self.prefix))
            .collect();

        for key in &owned {
            self.store.remove_item(key);
        }

        tracing::debug!("Cleared cache '{}' ({} durable keys removed)", self.name, owned.len());
    }

    /// Clear the cache and release the memory held by its map
    pub fn destroy(&self) {
        self.remove_all();
        self.entries.shrink_to_fit();
    }

    /// Number of entries in memory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the in-memory map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the in-memory keys
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<V> Cache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Store a value in memory and write it through to the durable mirror
    pub fn put_persisted(&self, key: impl Into<String>, value: V) -> CacheResult<V> {
        let key = key.into();
        let serialized = serde_json::to_string(&value)?;
        self.store.set_item(&self.durable_key(&key), &serialized);
        Ok(self.put(key, value))
    }

    /// Get a value from memory, falling back to the durable mirror on a miss.
    ///
    /// A durable hit is promoted into memory.
    pub fn get_persisted(&self, key: &str) -> CacheResult<Option<V>> {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        match self.store.get_item(&self.durable_key(key)) {
            Some(serialized) => {
                let value: V = serde_json::from_str(&serialized)?;
                tracing::debug!("Cache '{}' restored '{}' from durable storage", self.name, key);
                Ok(Some(self.put(key, value)))
            }
            None => Ok(None),
        }
    }
}
