use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Certificate expired at epoch {expiration}, now {now}")]
    CertificateExpired { expiration: u64, now: u64 },

    #[error("Certificate signed by an unexpected identity")]
    UnknownSigner,

    #[error("Expected {expected} certificate signature(s), got {got}")]
    SignatureCount { expected: usize, got: usize },

    #[error("Unsupported certificate: {0}")]
    UnsupportedCertificate(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(u64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid hash length")]
    InvalidHashLength,

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
