use thiserror::Error;

/// Coded failures of a read query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("error query format")]
    InvalidFormat,

    #[error("unsupported query")]
    Unsupported,

    #[error("cannot obtain epoch for the requested height")]
    EpochFailed,

    #[error("requested epoch has passed and will never get a document")]
    NoDocument,

    #[error("document for requested epoch is not ready yet")]
    DocumentNotReady,

    #[error("unknown failure for document query")]
    DocumentUnknown,

    #[error("state is closed")]
    StateClosed,
}

impl QueryError {
    pub fn code(&self) -> u32 {
        match self {
            QueryError::InvalidFormat => 0x31,
            QueryError::Unsupported => 0x32,
            QueryError::EpochFailed => 0x33,
            QueryError::NoDocument => 0x34,
            QueryError::DocumentNotReady => 0x35,
            QueryError::DocumentUnknown => 0x36,
            QueryError::StateClosed => 0x37,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x31 => Some(QueryError::InvalidFormat),
            0x32 => Some(QueryError::Unsupported),
            0x33 => Some(QueryError::EpochFailed),
            0x34 => Some(QueryError::NoDocument),
            0x35 => Some(QueryError::DocumentNotReady),
            0x36 => Some(QueryError::DocumentUnknown),
            0x37 => Some(QueryError::StateClosed),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("init_chain called after genesis")]
    InitChainAfterGenesis,

    #[error("State error: {0}")]
    State(#[from] dirauth_state::StateError),

    #[error("Core error: {0}")]
    Core(#[from] dirauth_core::CoreError),

    #[error("Transaction error: {0}")]
    Tx(#[from] dirauth_tx::TxError),
}
