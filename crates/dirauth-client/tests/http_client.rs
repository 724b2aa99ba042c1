//! Clients against a live RPC bridge on a loopback port.

use std::sync::Arc;

use async_trait::async_trait;
use dirauth_client::{
    AppHashSource, CacheConfig, CachingClient, ClientError, HttpPkiClient, PkiClient,
};
use dirauth_consensus::{Application, RequestBeginBlock};
use dirauth_core::testutil::TestNode;
use dirauth_core::{Codec, Hash};
use dirauth_mempool::{Mempool, MempoolConfig};
use dirauth_rpc::{RpcConfig, RpcServer};
use dirauth_state::{LedgerConfig, LedgerState, MemoryStorage};
use tokio_util::sync::CancellationToken;

struct Node {
    codec: Codec,
    app: Arc<Application<MemoryStorage>>,
    mempool: Arc<Mempool>,
    url: String,
}

impl Node {
    async fn start() -> Self {
        let codec = Codec::canonical();
        let state =
            LedgerState::open(codec, LedgerConfig::default(), MemoryStorage::new()).unwrap();
        let app = Arc::new(Application::new(Arc::new(state)));
        let mempool = Arc::new(Mempool::new(MempoolConfig::default(), codec));
        let server = RpcServer::new(RpcConfig::default(), Arc::clone(&app), Arc::clone(&mempool));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let router = server.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Node {
            codec,
            app,
            mempool,
            url,
        }
    }

    /// Commit one block containing everything in the pool
    async fn block(&self) {
        self.app.begin_block(&RequestBeginBlock {
            height: self.app.state().block_height() + 1,
            byzantine_validators: vec![],
        });
        for tx in self.mempool.take(usize::MAX).await {
            let resp = self.app.deliver_tx(&tx);
            assert!(resp.is_ok(), "deliver failed: {}", resp.log);
        }
        self.app.end_block();
        self.app.commit().unwrap();
    }

    fn client(&self) -> HttpPkiClient {
        HttpPkiClient::new(self.url.clone(), self.codec)
    }
}

struct WrongRoots;

#[async_trait]
impl AppHashSource for WrongRoots {
    async fn app_hash(&self, _height: u64) -> Result<Hash, ClientError> {
        Ok(Hash::ZERO)
    }
}

#[tokio::test]
async fn test_post_and_fetch_document() {
    let node = Node::start().await;
    let client = node.client();
    let ctx = CancellationToken::new();

    let nodes: Vec<TestNode> = (0..6)
        .map(|i| TestNode::mix(&node.codec, &format!("mix{}", i), 1))
        .chain(std::iter::once(TestNode::provider(&node.codec, "provider", 1)))
        .collect();
    for n in &nodes {
        client.post(&ctx, 1, &n.keys, &n.descriptor).await.unwrap();
    }
    assert_eq!(node.mempool.len().await, nodes.len());

    for _ in 0..4 {
        node.block().await;
    }

    let info = client.get_epoch(&ctx).await.unwrap();
    assert_eq!(info.epoch, 2);
    assert_eq!(info.elapsed_height, 0);

    let entry = client.get_doc(&ctx, 1).await.unwrap();
    assert_eq!(entry.epoch(), 1);
    assert!(entry.document.is_provider(&nodes[6].keys.public));
    assert_eq!(client.deserialize(&entry.raw).unwrap(), entry.document);

    let cached = CachingClient::new(node.client(), CacheConfig::default())
        .await
        .unwrap();
    assert_eq!(cached.get_epoch(&ctx).await.unwrap().epoch, 2);
    let first = cached.get_doc(&ctx, 1).await.unwrap();
    assert_eq!(first.raw, entry.raw);
    cached.shutdown().await;
}

#[tokio::test]
async fn test_document_errors() {
    let node = Node::start().await;
    let client = node.client();
    let ctx = CancellationToken::new();
    node.block().await;

    match client.get_doc(&ctx, 1).await {
        Err(ClientError::Query { code, .. }) => assert_eq!(code, 0x35),
        other => panic!("unexpected result: {:?}", other.map(|e| e.epoch())),
    }
}

#[tokio::test]
async fn test_rejected_post() {
    let node = Node::start().await;
    let client = node.client();
    let ctx = CancellationToken::new();

    let mut nameless = TestNode::mix(&node.codec, "mix", 1);
    nameless.descriptor.name.clear();
    assert!(matches!(
        client
            .post(&ctx, 1, &nameless.keys, &nameless.descriptor)
            .await,
        Err(ClientError::Core(_))
    ));
    assert!(node.mempool.is_empty().await);

    // Signing is deterministic, so a repeat is the same transaction.
    let mix = TestNode::mix(&node.codec, "mix", 1);
    client.post(&ctx, 1, &mix.keys, &mix.descriptor).await.unwrap();
    assert!(matches!(
        client.post(&ctx, 1, &mix.keys, &mix.descriptor).await,
        Err(ClientError::Http(_))
    ));
    assert_eq!(node.mempool.len().await, 1);
}

#[tokio::test]
async fn test_proof_checked_against_roots() {
    let node = Node::start().await;
    node.block().await;
    let ctx = CancellationToken::new();

    assert!(node.client().get_epoch(&ctx).await.is_ok());
    let pinned = node.client().with_roots(Arc::new(WrongRoots));
    assert!(matches!(
        pinned.get_epoch(&ctx).await,
        Err(ClientError::InvalidProof(_))
    ));
}
