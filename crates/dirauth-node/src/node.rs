use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use dirauth_consensus::Application;
use dirauth_core::Codec;
use dirauth_mempool::Mempool;
use dirauth_rpc::{RpcConfig, RpcServer};
use dirauth_state::{FileStorage, LedgerState};
use tracing::info;

use crate::config::NodeConfig;

/// The directory authority node
pub struct Node {
    config: NodeConfig,
    app: Arc<Application<FileStorage>>,
    mempool: Arc<Mempool>,
}

impl Node {
    /// Open the persisted ledger and wire the application to a fresh pool
    pub fn new(config: NodeConfig) -> Result<Self> {
        let codec = Codec::canonical();
        let storage = FileStorage::new(config.state_path());
        let state = LedgerState::open(codec, config.ledger_config(), storage)?;

        info!(
            "Ledger opened at height {} (epoch {}, genesis: {})",
            state.block_height(),
            state.current_epoch(),
            state.is_genesis()
        );

        let app = Arc::new(Application::new(Arc::new(state)));
        let mempool = Arc::new(Mempool::new(config.mempool_config(), codec));

        Ok(Node {
            config,
            app,
            mempool,
        })
    }

    /// Serve until interrupted
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then close the ledger
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting directory authority node");

        let rpc_config = RpcConfig {
            http_addr: self.config.rpc_addr,
        };
        let server = RpcServer::new(rpc_config, Arc::clone(&self.app), Arc::clone(&self.mempool));
        let result = server.run_until(shutdown).await;

        self.app.close();
        info!("Node stopped");
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirauth_consensus::{RequestBeginBlock, RequestInitChain, RequestQuery};
    use dirauth_core::{Command, Query};

    fn test_config(dir: &tempfile::TempDir) -> NodeConfig {
        NodeConfig {
            data_dir: dir.path().to_path_buf(),
            rpc_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    fn empty_block(node: &Node) {
        let app = &node.app;
        app.begin_block(&RequestBeginBlock {
            height: app.state().block_height() + 1,
            byzantine_validators: vec![],
        });
        app.end_block();
        app.commit().unwrap();
    }

    #[test]
    fn test_node_creation() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(test_config(&dir)).unwrap();

        assert!(node.app.state().is_genesis());
        assert_eq!(node.app.info().last_block_height, 0);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let app_hash = {
            let node = Node::new(test_config(&dir)).unwrap();
            node.app.init_chain(RequestInitChain::default()).unwrap();
            for _ in 0..3 {
                empty_block(&node);
            }
            node.app.state().app_hash()
        };
        assert!(dir.path().join(crate::config::STATE_FILE).exists());

        let node = Node::new(test_config(&dir)).unwrap();
        let info = node.app.info();
        assert_eq!(info.last_block_height, 3);
        assert_eq!(info.last_block_app_hash, app_hash);
        assert!(!node.app.state().is_genesis());
    }

    #[tokio::test]
    async fn test_run_closes_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(test_config(&dir)).unwrap();
        let app = Arc::clone(&node.app);

        node.run_until(async {}).await.unwrap();

        let codec = Codec::canonical();
        let resp = app.query(&RequestQuery {
            data: Query::new(Command::GetEpoch, 0).encode(&codec).unwrap(),
            height: 0,
        });
        assert_eq!(resp.code, 0x37);
    }
}
