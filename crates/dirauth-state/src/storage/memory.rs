use std::sync::Arc;

use parking_lot::Mutex;

use super::{Entries, Storage};
use crate::error::StateError;

/// In-memory storage. Clones share the same saved version, so a clone can
/// stand in for reopening the same database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    saved: Arc<Mutex<Option<(u64, Entries)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Version of the last save, if any
    pub fn saved_version(&self) -> Option<u64> {
        self.saved.lock().as_ref().map(|(v, _)| *v)
    }

    /// Overwrite a saved value directly (for corruption tests)
    pub fn tamper(&self, key: &[u8], value: Option<Vec<u8>>) {
        if let Some((_, entries)) = self.saved.lock().as_mut() {
            match value {
                Some(v) => {
                    entries.insert(key.to_vec(), v);
                }
                None => {
                    entries.remove(key);
                }
            }
        }
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Option<(u64, Entries)>, StateError> {
        Ok(self.saved.lock().clone())
    }

    fn save(&mut self, version: u64, entries: &Entries) -> Result<(), StateError> {
        *self.saved.lock() = Some((version, entries.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_load() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());
        assert_eq!(storage.saved_version(), None);
    }

    #[test]
    fn test_clones_share_saves() {
        let mut storage = MemoryStorage::new();
        let reopened = storage.clone();

        let mut entries = Entries::new();
        entries.insert(b"key1".to_vec(), b"value1".to_vec());
        storage.save(3, &entries).unwrap();

        let (version, loaded) = reopened.load().unwrap().unwrap();
        assert_eq!(version, 3);
        assert_eq!(loaded, entries);
    }

    #[test]
    fn test_save_replaces_previous() {
        let mut storage = MemoryStorage::new();
        let mut entries = Entries::new();
        entries.insert(b"a".to_vec(), b"1".to_vec());
        storage.save(1, &entries).unwrap();
        entries.remove(b"a".as_slice());
        storage.save(2, &entries).unwrap();

        let (version, loaded) = storage.load().unwrap().unwrap();
        assert_eq!(version, 2);
        assert!(loaded.is_empty());
    }
}
