/// Mempool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MempoolError {
    #[error("Transaction already exists in mempool")]
    AlreadyExists,

    #[error("Mempool is full")]
    PoolFull,

    #[error("Sender has reached transaction limit")]
    SenderLimitReached,

    #[error("Invalid transaction")]
    InvalidTransaction,
}
