//! Durable store for environments without persistent storage

use crate::DurableStore;

/// A store that keeps nothing.
///
/// Used when no durable storage is available; every write is dropped and
/// every read misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl DurableStore for NullStore {
    fn set_item(&self, _key: &str, _value: &str) {}

    fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn remove_item(&self, _key: &str) {}

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_available(&self) -> bool {
        false
    }
}
