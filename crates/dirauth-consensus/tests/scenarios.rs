//! End-to-end block flows through the application.

use std::sync::Arc;

use dirauth_consensus::{Application, RequestBeginBlock, RequestQuery, ResponseCommit};
use dirauth_core::testutil::{add_authority_tx, TestNode};
use dirauth_core::{
    verify_and_parse_document, verify_merkle_proof, Authority, Codec, Command, EpochRecord,
    KeyPair, Query,
};
use dirauth_state::{LedgerConfig, LedgerState, MemoryStorage};

fn new_app() -> (Codec, Application<MemoryStorage>) {
    let codec = Codec::canonical();
    let state = LedgerState::open(codec, LedgerConfig::default(), MemoryStorage::new()).unwrap();
    (codec, Application::new(Arc::new(state)))
}

/// Run one block delivering `txs`
fn block(app: &Application<MemoryStorage>, txs: &[Vec<u8>]) -> ResponseCommit {
    app.begin_block(&RequestBeginBlock {
        height: app.state().block_height() + 1,
        byzantine_validators: vec![],
    });
    for tx in txs {
        let resp = app.deliver_tx(tx);
        assert!(resp.is_ok(), "deliver failed: {}", resp.log);
    }
    app.end_block();
    app.commit().unwrap()
}

fn consensus_query(codec: &Codec, epoch: u64, height: u64) -> RequestQuery {
    RequestQuery {
        data: Query::new(Command::GetConsensus, epoch).encode(codec).unwrap(),
        height,
    }
}

fn full_epoch(codec: &Codec, epoch: u64) -> (Vec<TestNode>, Vec<Vec<u8>>) {
    let mut nodes: Vec<TestNode> = (0..6)
        .map(|i| TestNode::mix(codec, &format!("mix{}", i), epoch))
        .collect();
    nodes.push(TestNode::provider(codec, "provider", epoch));
    let txs = nodes.iter().map(|n| n.publish_tx(codec, epoch)).collect();
    (nodes, txs)
}

#[test]
fn test_published_descriptor_lands_in_document() {
    let (codec, app) = new_app();
    let (nodes, txs) = full_epoch(&codec, 1);

    for tx in &txs {
        assert!(app.check_tx(tx).is_ok());
    }
    block(&app, &txs);
    let mut last = None;
    for _ in 0..3 {
        last = Some(block(&app, &[]));
    }
    // Height 4 closes epoch 1.
    let last = last.unwrap();
    assert_eq!(last.height, 4);
    assert_eq!(last.epoch, 2);

    let resp = app.query(&consensus_query(&codec, 1, 0));
    assert!(resp.is_ok(), "query failed: {}", resp.log);
    let document = verify_and_parse_document(&codec, &resp.value).unwrap();
    assert_eq!(document.epoch, 1);
    for node in nodes.iter().take(6) {
        assert!(document.layer_of(&node.keys.public).is_some());
    }
    assert!(document.is_provider(&nodes[6].keys.public));

    let wire: dirauth_core::DocumentWire = codec.decode(&resp.value).unwrap();
    assert!(wire
        .topology
        .iter()
        .flatten()
        .any(|raw| raw == &nodes[0].raw));
}

#[test]
fn test_authority_added_twice() {
    let (codec, app) = new_app();
    let signer = KeyPair::generate();
    let candidate = KeyPair::generate();
    let tx = add_authority_tx(
        &codec,
        &signer,
        &Authority::new("carol", &candidate.public, 1),
        1,
    );

    assert!(app.check_tx(&tx).is_ok());
    block(&app, &[tx.clone()]);

    let resp = app.check_tx(&tx);
    assert_eq!(resp.code, 0x1A);
    assert!(resp.log.contains("authority already exists"));
}

#[test]
fn test_historic_document_proof() {
    let (codec, app) = new_app();
    let (_, txs) = full_epoch(&codec, 1);
    block(&app, &txs);
    let closing = (0..3).map(|_| block(&app, &[])).last().unwrap();

    // Uploads for the next epoch move the root past the one the document
    // was proven against.
    let (_, next) = full_epoch(&codec, 2);
    block(&app, &next[..3]);
    block(&app, &next[3..]);
    assert_ne!(app.state().app_hash(), closing.data);

    let resp = app.query(&consensus_query(&codec, 1, closing.height));
    assert!(resp.is_ok(), "query failed: {}", resp.log);
    assert_eq!(resp.height, closing.height);
    let recorded = app.state().app_hash_at(closing.height).unwrap();
    assert_eq!(recorded, closing.data);
    let proof = resp.proof.unwrap();
    assert!(verify_merkle_proof(&proof, &recorded));
    assert!(!verify_merkle_proof(&proof, &app.state().app_hash()));

    let current = app.state().current_epoch();
    let resp = app.query(&consensus_query(&codec, current + 1, 0));
    assert_eq!(resp.code, 0x35);

    // Before the closing height the document was still being prepared.
    let resp = app.query(&consensus_query(&codec, 1, closing.height - 1));
    assert_eq!(resp.code, 0x35);
}

#[test]
fn test_epoch_query_tracks_commits() {
    let (codec, app) = new_app();
    let (_, txs) = full_epoch(&codec, 1);
    block(&app, &txs);
    for _ in 0..3 {
        block(&app, &[]);
    }

    let resp = app.query(&RequestQuery {
        data: Query::new(Command::GetEpoch, 0).encode(&codec).unwrap(),
        height: 0,
    });
    assert!(resp.is_ok());
    let record = EpochRecord::decode(&resp.value).unwrap();
    assert_eq!(record.epoch, 2);
    assert_eq!(record.start_height, 4);

    let info = app.info();
    assert_eq!(info.last_block_height, 4);
    assert_eq!(info.last_block_app_hash, app.state().app_hash());
}

#[test]
fn test_starved_epoch_does_not_advance() {
    let (codec, app) = new_app();
    let node = TestNode::mix(&codec, "lonely", 1);
    block(&app, &[node.publish_tx(&codec, 1)]);
    for _ in 0..6 {
        let commit = block(&app, &[]);
        assert_eq!(commit.epoch, 1);
    }
    assert_eq!(app.query(&consensus_query(&codec, 1, 0)).code, 0x35);
}
