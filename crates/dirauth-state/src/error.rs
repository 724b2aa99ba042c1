use thiserror::Error;

use crate::generator::GenerateError;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Conflicting descriptor from {identity} for epoch {epoch}")]
    ConflictingDescriptor { identity: String, epoch: u64 },

    #[error("Late descriptor upload from {identity} for epoch {epoch}")]
    LateDescriptor { identity: String, epoch: u64 },

    #[error("Conflicting document for epoch {0}")]
    ConflictingDocument(u64),

    #[error("Authority already exists: {0}")]
    AuthorityExists(String),

    #[error("Authority not found: {0}")]
    AuthorityNotFound(String),

    #[error("No document for epoch {0}")]
    NoDocument(u64),

    #[error("Document for epoch {0} is not ready")]
    DocumentNotReady(u64),

    #[error("Requesting document for a too future epoch {0}")]
    DocumentUnknown(u64),

    #[error("Version {0} is not available")]
    VersionNotFound(u64),

    #[error("No epoch record at height {0}")]
    EpochRecordMissing(u64),

    #[error("State is closed")]
    Closed,

    #[error("Corrupt epoch record: {0}")]
    CorruptEpochRecord(String),

    #[error("Corrupt authority record: {0}")]
    CorruptAuthority(String),

    #[error("Genesis already initialized")]
    GenesisInitialized,

    #[error("Document generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Core error: {0}")]
    Core(#[from] dirauth_core::CoreError),
}
