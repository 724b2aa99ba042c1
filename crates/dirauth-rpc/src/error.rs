use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dirauth_consensus::ConsensusError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Mempool error: {0}")]
    Mempool(#[from] dirauth_mempool::MempoolError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RpcError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            RpcError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RpcError::Mempool(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            RpcError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            RpcError::Consensus(ConsensusError::InitChainAfterGenesis) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            RpcError::Consensus(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}
