pub mod memory;
pub mod persistent;

use std::collections::BTreeMap;

use crate::error::StateError;

pub type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// Backend holding the most recently saved tree version
pub trait Storage: Send + Sync {
    /// Last saved version and its entries, if anything was ever saved
    fn load(&self) -> Result<Option<(u64, Entries)>, StateError>;

    /// Persist `entries` as `version`, replacing whatever was saved before
    fn save(&mut self, version: u64, entries: &Entries) -> Result<(), StateError>;
}

pub use memory::MemoryStorage;
pub use persistent::FileStorage;
