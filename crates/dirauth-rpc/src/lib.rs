//! Dirauth RPC - HTTP bridge
//!
//! This crate exposes the application to the consensus engine and to
//! directory clients over HTTP.

pub mod error;
pub mod http;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dirauth_consensus::Application;
use dirauth_mempool::Mempool;
use dirauth_state::Storage;
use tracing::info;

use http::{create_router, AppState};

pub use error::RpcError;
pub use http::handlers::{
    AppHashResponse, BeginBlockResponse, BroadcastResponse, PendingResponse, StatusResponse,
};

pub const DEFAULT_RPC_PORT: u16 = 26657;

/// RPC server configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// HTTP bind address
    pub http_addr: SocketAddr,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            http_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RPC_PORT)),
        }
    }
}

/// RPC server
pub struct RpcServer<S: Storage> {
    config: RpcConfig,
    app_state: Arc<AppState<S>>,
}

impl<S: Storage + 'static> RpcServer<S> {
    pub fn new(config: RpcConfig, app: Arc<Application<S>>, mempool: Arc<Mempool>) -> Self {
        let app_state = Arc::new(AppState { app, mempool });
        RpcServer { config, app_state }
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.app_state))
    }

    /// Run the RPC server
    pub async fn run(self) -> Result<(), std::io::Error> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drain open connections
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let addr = self.config.http_addr;

        info!("Starting RPC server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
