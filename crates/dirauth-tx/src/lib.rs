//! Dirauth Tx - Transaction validation and execution
//!
//! This crate authenticates signed transactions, interprets their payloads,
//! and stages the resulting descriptor and authority updates in the ledger.

pub mod error;
pub mod executor;
pub mod policy;
pub mod validation;

pub use error::{TxError, CODE_OK};
pub use executor::Executor;
pub use policy::{AuthorizationPolicy, ReferencePolicy};
pub use validation::{validate_transaction, TxKind, ValidatedTx};
