//! In-process durable store, mostly useful for tests and short-lived tools

use crate::DurableStore;
use dashmap::DashMap;

/// Durable store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: DashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn set_item(&self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|item| item.value().clone())
    }

    fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.items.iter().map(|item| item.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();

        store.set_item("a", "1");
        store.set_item("b", "2");
        assert_eq!(store.get_item("a"), Some("1".to_string()));
        assert_eq!(store.len(), 2);

        store.remove_item("a");
        assert!(!store.contains("a"));

        let keys = store.keys();
        assert_eq!(keys, vec!["b".to_string()]);
    }
}
