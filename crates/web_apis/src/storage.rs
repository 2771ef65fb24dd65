//! Key/value storage (localStorage).

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A key/value storage area shared by the components of a page.
///
/// Methods take `&self`; implementations synchronize internally. Reads can
/// fail as well as writes, since a disabled area refuses both.
pub trait Storage: Send + Sync {
    fn length(&self) -> usize;

    /// Key at `index` in insertion order.
    fn key(&self, index: usize) -> Option<String>;

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str);

    fn clear(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage is disabled")]
    Disabled,
}

/// Default per-origin quota in bytes.
pub const DEFAULT_QUOTA: usize = 5 * 1024 * 1024;

/// In-memory storage area. Keys keep insertion order, so `key(i)` is
/// stable until the entry is removed.
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    entries: IndexMap<String, String>,
    used: usize,
    quota: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA)
    }

    /// Storage area holding at most `quota` bytes of keys and values.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            used: 0,
            quota,
        }
    }

    /// Bytes currently used.
    pub fn usage(&self) -> usize {
        self.used
    }

    pub fn length(&self) -> usize {
        self.entries.len()
    }

    pub fn key(&self, index: usize) -> Option<String> {
        self.entries.get_index(index).map(|(key, _)| key.clone())
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    pub fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let freed = self.entries.get(key).map_or(0, |old| key.len() + old.len());
        let used = self.used - freed + key.len() + value.len();
        if used > self.quota {
            tracing::warn!(key, used, quota = self.quota, "storage quota exceeded");
            return Err(StorageError::QuotaExceeded);
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.used = used;
        Ok(())
    }

    pub fn remove_item(&mut self, key: &str) {
        if let Some(old) = self.entries.shift_remove(key) {
            self.used -= key.len() + old.len();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// localStorage for one origin. Clones share the same storage area.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    storage: Arc<RwLock<MemoryStorage>>,
    origin: String,
}

impl LocalStorage {
    /// Empty storage area for `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_storage(origin, MemoryStorage::new())
    }

    pub fn with_storage(origin: impl Into<String>, storage: MemoryStorage) -> Self {
        Self {
            storage: Arc::new(RwLock::new(storage)),
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Storage for LocalStorage {
    fn length(&self) -> usize {
        self.storage.read().length()
    }

    fn key(&self, index: usize) -> Option<String> {
        self.storage.read().key(index)
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.storage.read().get_item(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage.write().set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        self.storage.write().remove_item(key)
    }

    fn clear(&self) {
        self.storage.write().clear()
    }
}

/// Storage that refuses every access, as in a privacy mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledStorage;

impl Storage for DisabledStorage {
    fn length(&self) -> usize {
        0
    }

    fn key(&self, _index: usize) -> Option<String> {
        None
    }

    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Disabled)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Disabled)
    }

    fn remove_item(&self, _key: &str) {}

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new();

        storage.set_item("media-volume", "0.5").unwrap();
        storage.set_item("media-rate", "1").unwrap();
        assert_eq!(storage.get_item("media-volume"), Some("0.5".to_string()));
        assert_eq!(storage.length(), 2);
        assert_eq!(storage.usage(), "media-volume0.5media-rate1".len());

        storage.remove_item("media-volume");
        assert_eq!(storage.get_item("media-volume"), None);
        assert_eq!(storage.key(0), Some("media-rate".to_string()));
        assert_eq!(storage.usage(), "media-rate1".len());

        storage.clear();
        assert_eq!(storage.length(), 0);
        assert_eq!(storage.usage(), 0);
    }

    #[test]
    fn test_quota_counts_replacements_once() {
        let mut storage = MemoryStorage::with_quota(10);

        storage.set_item("a", "12345").unwrap();
        assert_eq!(storage.set_item("b", "123456"), Err(StorageError::QuotaExceeded));
        assert_eq!(storage.length(), 1);

        storage.set_item("a", "123456789").unwrap();
        assert_eq!(storage.usage(), 10);
    }

    #[test]
    fn test_local_storage_clones_share_area() {
        let storage = LocalStorage::new("https://player.local");
        let other = storage.clone();

        storage.set_item("media-volume", "{}").unwrap();
        assert_eq!(other.get_item("media-volume").unwrap(), Some("{}".to_string()));
        assert_eq!(other.length(), 1);
        assert_eq!(other.origin(), "https://player.local");
    }

    #[test]
    fn test_disabled_storage_errors() {
        let storage = DisabledStorage;
        assert_eq!(storage.get_item("k"), Err(StorageError::Disabled));
        assert_eq!(storage.set_item("k", "v"), Err(StorageError::Disabled));
        assert_eq!(storage.length(), 0);
    }
}
