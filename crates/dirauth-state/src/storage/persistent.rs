use std::fs;
use std::path::{Path, PathBuf};

use dirauth_core::encoding;
use tracing::debug;

use super::{Entries, Storage};
use crate::error::StateError;

/// File-backed storage keeping the latest version in a single snapshot file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Option<(u64, Entries)>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| StateError::Storage(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let snapshot: (u64, Entries) = encoding::from_bytes(&bytes)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        debug!(
            "Loaded version {} ({} keys) from {:?}",
            snapshot.0,
            snapshot.1.len(),
            self.path
        );
        Ok(Some(snapshot))
    }

    fn save(&mut self, version: u64, entries: &Entries) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::Storage(e.to_string()))?;
        }

        let bytes = encoding::to_bytes(&(version, entries))
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| StateError::Storage(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("state.bin"));
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.bin");
        let mut storage = FileStorage::new(&path);

        let mut entries = Entries::new();
        entries.insert(b"k_epoch".to_vec(), vec![1u8; 16]);
        storage.save(7, &entries).unwrap();

        let reopened = FileStorage::new(&path);
        let (version, loaded) = reopened.load().unwrap().unwrap();
        assert_eq!(version, 7);
        assert_eq!(loaded, entries);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        fs::write(&path, b"\x01").unwrap();
        assert!(FileStorage::new(&path).load().is_err());
    }
}
