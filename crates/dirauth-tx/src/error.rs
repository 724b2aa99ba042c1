use thiserror::Error;

pub const CODE_OK: u32 = 0;

/// Rejection reasons for a transaction, each with a stable wire code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("transaction is not valid json string: {0}")]
    Malformed(String),

    #[error("wrong public key size in transaction")]
    WrongPublicKeySize,

    #[error("wrong signature size in transaction")]
    WrongSignatureSize,

    #[error("wrong signature in transaction")]
    WrongSignature,

    #[error("cannot get descriptor verifier: {0}")]
    DescriptorInvalidVerifier(String),

    #[error("cannot verify and parse descriptor: {0}")]
    DescriptorFalseVerification(String),

    #[error("descriptor is not authorized")]
    DescriptorNotAuthorized,

    #[error("cannot parse authority: {0}")]
    AuthorityParse(String),

    #[error("authority is not authorized")]
    AuthorityNotAuthorized,

    #[error("transaction command not found: {0}")]
    UnknownCommand(u64),

    #[error("authority already exists")]
    AuthorityExists,

    #[error("transaction epoch {epoch} outside the window of current epoch {current}")]
    WrongEpoch { epoch: u64, current: u64 },

    #[error("error updating descriptor: {0}")]
    DescriptorUpdate(String),

    #[error("error updating authority: {0}")]
    AuthorityUpdate(String),
}

impl TxError {
    pub fn code(&self) -> u32 {
        match self {
            TxError::Malformed(_) => 0x01,
            TxError::WrongPublicKeySize => 0x02,
            TxError::WrongSignatureSize => 0x03,
            TxError::WrongSignature => 0x04,
            TxError::DescriptorInvalidVerifier(_) => 0x11,
            TxError::DescriptorFalseVerification(_) => 0x12,
            TxError::DescriptorNotAuthorized => 0x13,
            TxError::AuthorityParse(_) => 0x17,
            TxError::AuthorityNotAuthorized => 0x18,
            TxError::UnknownCommand(_) => 0x19,
            TxError::AuthorityExists => 0x1A,
            TxError::WrongEpoch { .. } => 0x21,
            TxError::DescriptorUpdate(_) => 0x22,
            TxError::AuthorityUpdate(_) => 0x24,
        }
    }
}
