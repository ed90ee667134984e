//! Durable store backed by a JSON file on the local filesystem

use crate::{CacheError, CacheResult, DurableStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Durable store persisted as one JSON object file.
///
/// The file is read once on open and rewritten after every mutation. Write
/// failures are logged and otherwise ignored; the in-memory view stays
/// authoritative for the lifetime of the store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();

        let items = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| {
                CacheError::Backend(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened durable store at {} ({} items)", path.display(), items.len());

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, items: &BTreeMap<String, String>) {
        let serialized = match serde_json::to_string(items) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("Failed to serialize durable store {}: {}", self.path.display(), e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!("Failed to create directory {}: {}", parent.display(), e);
                    return;
                }
            }
        }

        if let Err(e) = fs::write(&self.path, serialized) {
            tracing::warn!("Failed to write durable store {}: {}", self.path.display(), e);
        }
    }
}

impl DurableStore for FileStore {
    fn set_item(&self, key: &str, value: &str) {
        let mut items = self.items.lock();
        items.insert(key.to_string(), value.to_string());
        self.flush(&items);
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn remove_item(&self, key: &str) {
        let mut items = self.items.lock();
        if items.remove(key).is_some() {
            self.flush(&items);
        }
    }

    fn keys(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set_item("convex-items:1", "{\"id\":\"1\"}");
            store.set_item("other", "foo");
            store.remove_item("other");
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_item("convex-items:1"),
            Some("{\"id\":\"1\"}".to_string())
        );
        assert_eq!(reopened.get_item("other"), None);
        assert_eq!(reopened.keys(), vec!["convex-items:1".to_string()]);
    }

    #[test]
    fn test_file_store_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = FileStore::open(&path).unwrap();
        store.set_item("key", "value");
        assert!(path.exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStore::open(&path), Err(CacheError::Serialization(_))));
    }
}
