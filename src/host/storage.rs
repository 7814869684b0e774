use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// A string key/value storage area, such as session or persistent storage.
pub trait KeyValueStore: Send + Sync {
    /// Whether this storage is actually available. Unavailable storage is
    /// never read or written.
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// In-memory storage area.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Storage for contexts where none exists. Reads nothing, writes nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStorage;

impl KeyValueStore for NoStorage {
    fn is_available(&self) -> bool {
        false
    }

    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) {}

    fn remove(&self, _key: &str) {}
}
