use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use dirauth_state::Storage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    begin_block, broadcast_tx, commit, deliver_tx, end_block, get_app_hash, get_status, info,
    init_chain, pending, query, AppState,
};

/// Create the HTTP router
pub fn create_router<S: Storage + 'static>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(get_status::<S>))
        .route("/status/app_hash/{height}", get(get_app_hash::<S>))
        .route("/query", post(query::<S>))
        .route("/broadcast_tx", post(broadcast_tx::<S>))
        .route("/abci/info", post(info::<S>))
        .route("/abci/init_chain", post(init_chain::<S>))
        .route("/abci/begin_block", post(begin_block::<S>))
        .route("/abci/deliver_tx", post(deliver_tx::<S>))
        .route("/abci/end_block", post(end_block::<S>))
        .route("/abci/commit", post(commit::<S>))
        .route("/abci/pending", get(pending::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
