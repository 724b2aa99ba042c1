//! Dirauth Consensus - Adapter between the consensus engine and the ledger
//!
//! This crate turns engine callbacks (info, check, deliver, block
//! boundaries, commit, query) into ledger operations and coded responses.

pub mod app;
pub mod error;
pub mod types;

pub use app::{Application, APP_VERSION};
pub use error::{ConsensusError, QueryError};
pub use types::{
    EvidenceKind, Misbehavior, RequestBeginBlock, RequestInitChain, RequestQuery, RequestTx,
    ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo,
    ResponseInitChain, ResponseQuery, CODE_OK,
};
