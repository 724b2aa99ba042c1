use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("pki client was halted")]
    Halted,

    #[error("request cancelled")]
    Cancelled,

    #[error("posting is disabled on a read-only client")]
    ReadOnly,

    #[error("initial epoch fetch timed out")]
    HandshakeTimeout,

    #[error("no document for epoch {0}")]
    NoDocument(u64),

    #[error("query failed with code {code:#04x}: {log}")]
    Query { code: u32, log: String },

    #[error("transaction rejected with code {code:#04x}: {log}")]
    Rejected { code: u32, log: String },

    #[error("document for epoch {got} returned, expected {expected}")]
    InvalidEpoch { expected: u64, got: u64 },

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Core error: {0}")]
    Core(#[from] dirauth_core::CoreError),
}
