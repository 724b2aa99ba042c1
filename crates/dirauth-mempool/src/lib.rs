//! Dirauth Mempool - Admission pool
//!
//! This crate holds transactions that passed `check_tx` until the engine
//! pulls them into a block.

pub mod error;
pub mod pool;

pub use error::MempoolError;
pub use pool::{Mempool, MempoolConfig, PendingTransaction};
