use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use dirauth_consensus::{
    Application, RequestBeginBlock, RequestInitChain, RequestQuery, RequestTx, ResponseCommit,
    ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery, CODE_OK,
};
use dirauth_core::{tx_hash, Hash};
use dirauth_mempool::Mempool;
use dirauth_state::Storage;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use tracing::{debug, info};

use crate::error::RpcError;

const DEFAULT_PENDING_LIMIT: usize = 1000;

/// Application state shared with handlers
pub struct AppState<S: Storage> {
    pub app: Arc<Application<S>>,
    pub mempool: Arc<Mempool>,
}

// Response types

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub height: u64,
    pub app_hash: Hash,
    pub epoch: u64,
    pub epoch_start_height: u64,
    pub mempool_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppHashResponse {
    pub height: u64,
    pub app_hash: Hash,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub hash: Hash,
    pub code: u32,
    pub log: String,
}

impl BroadcastResponse {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    #[serde_as(as = "Vec<Hex>")]
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BeginBlockResponse {
    pub height: u64,
}

// Request types

#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub max: Option<usize>,
}

// Handlers

/// GET /status - Get node status
pub async fn get_status<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<StatusResponse>, RpcError> {
    let mempool_size = state.mempool.len().await;
    let ledger = state.app.state();

    Ok(Json(StatusResponse {
        version: state.app.info().version,
        height: ledger.block_height(),
        app_hash: ledger.app_hash(),
        epoch: ledger.current_epoch(),
        epoch_start_height: ledger.epoch_start_height(),
        mempool_size,
    }))
}

/// GET /status/app_hash/{height} - Root committed at a height
pub async fn get_app_hash<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(height): Path<u64>,
) -> Result<Json<AppHashResponse>, RpcError> {
    let app_hash = state
        .app
        .state()
        .app_hash_at(height)
        .ok_or_else(|| RpcError::NotFound(format!("No version retained for height {}", height)))?;
    Ok(Json(AppHashResponse { height, app_hash }))
}

/// POST /query - Run a read query
pub async fn query<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RequestQuery>,
) -> Result<Json<ResponseQuery>, RpcError> {
    Ok(Json(state.app.query(&request)))
}

/// POST /broadcast_tx - Check a transaction and queue it for inclusion
pub async fn broadcast_tx<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RequestTx>,
) -> Result<Json<BroadcastResponse>, RpcError> {
    let hash = tx_hash(&request.tx);
    let check = state.app.check_tx(&request.tx);
    if !check.is_ok() {
        debug!("Rejected transaction {}: {}", hash, check.log);
        return Ok(Json(BroadcastResponse {
            hash,
            code: check.code,
            log: check.log,
        }));
    }

    state.mempool.add(request.tx).await?;
    info!("Transaction {} submitted to mempool", hash);

    Ok(Json(BroadcastResponse {
        hash,
        code: CODE_OK,
        log: String::new(),
    }))
}

/// GET /abci/pending - Transactions waiting for a block
pub async fn pending<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<PendingParams>,
) -> Result<Json<PendingResponse>, RpcError> {
    let max = params.max.unwrap_or(DEFAULT_PENDING_LIMIT);
    Ok(Json(PendingResponse {
        txs: state.mempool.get_transactions(max).await,
    }))
}

/// POST /abci/info
pub async fn info<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ResponseInfo>, RpcError> {
    Ok(Json(state.app.info()))
}

/// POST /abci/init_chain
pub async fn init_chain<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RequestInitChain>,
) -> Result<Json<ResponseInitChain>, RpcError> {
    let response = state.app.init_chain(request)?;
    info!("Initialized chain with app hash {}", response.app_hash);
    Ok(Json(response))
}

/// POST /abci/begin_block
pub async fn begin_block<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RequestBeginBlock>,
) -> Result<Json<BeginBlockResponse>, RpcError> {
    state.app.begin_block(&request);
    Ok(Json(BeginBlockResponse {
        height: request.height,
    }))
}

/// POST /abci/deliver_tx
pub async fn deliver_tx<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RequestTx>,
) -> Result<Json<ResponseDeliverTx>, RpcError> {
    let response = state.app.deliver_tx(&request.tx);
    // Included in the block either way.
    state.mempool.remove(&tx_hash(&request.tx)).await;
    Ok(Json(response))
}

/// POST /abci/end_block
pub async fn end_block<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ResponseEndBlock>, RpcError> {
    Ok(Json(state.app.end_block()))
}

/// POST /abci/commit
pub async fn commit<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ResponseCommit>, RpcError> {
    let response = state.app.commit()?;
    debug!(
        "Committed height {} (epoch {}) with app hash {}",
        response.height, response.epoch, response.data
    );
    Ok(Json(response))
}
