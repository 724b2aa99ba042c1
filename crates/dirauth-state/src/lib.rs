//! Dirauth State - Ledger state and document generation
//!
//! This crate provides the versioned key/value ledger with merkle proofs,
//! epoch and authority bookkeeping, storage backends, and the per-epoch
//! document generator.

pub mod error;
pub mod generator;
pub mod keys;
pub mod state;
pub mod storage;
pub mod topology;
pub mod tree;

pub use error::StateError;
pub use generator::{generate, GenerateError, GeneratedDocument, GeneratorConfig};
pub use state::{CommitOutcome, LedgerConfig, LedgerState, ProvenValue};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use tree::{TreeVersion, VersionedTree};
