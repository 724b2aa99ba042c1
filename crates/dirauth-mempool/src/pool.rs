use std::collections::{BTreeMap, HashMap, HashSet};

use dirauth_core::{tx_hash, Codec, Hash, Transaction};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::MempoolError;

/// Configuration for the mempool
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the pool
    pub max_size: usize,
    /// Maximum transactions per signing key
    pub max_per_sender: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_size: 10_000,
            max_per_sender: 100,
        }
    }
}

/// A pending transaction in the mempool
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub raw: Vec<u8>,
    pub hash: Hash,
    /// Hex public key of the signer
    pub sender: String,
    /// Admission order
    pub seq: u64,
}

#[derive(Default)]
struct PoolInner {
    by_hash: HashMap<Hash, PendingTransaction>,
    by_sender: HashMap<String, HashSet<Hash>>,
    by_seq: BTreeMap<u64, Hash>,
    next_seq: u64,
}

impl PoolInner {
    fn remove(&mut self, hash: &Hash) -> Option<PendingTransaction> {
        let pending = self.by_hash.remove(hash)?;
        if let Some(sender_txs) = self.by_sender.get_mut(&pending.sender) {
            sender_txs.remove(hash);
            if sender_txs.is_empty() {
                self.by_sender.remove(&pending.sender);
            }
        }
        self.by_seq.remove(&pending.seq);
        Some(pending)
    }
}

/// FIFO pool of raw transactions keyed by their hash
pub struct Mempool {
    config: MempoolConfig,
    codec: Codec,
    inner: RwLock<PoolInner>,
}

impl Mempool {
    pub fn new(config: MempoolConfig, codec: Codec) -> Self {
        Mempool {
            config,
            codec,
            inner: RwLock::new(PoolInner::default()),
        }
    }

    /// Add a raw transaction to the mempool
    pub async fn add(&self, raw: Vec<u8>) -> Result<Hash, MempoolError> {
        let tx = Transaction::decode(&self.codec, &raw)
            .map_err(|_| MempoolError::InvalidTransaction)?;
        let hash = tx_hash(&raw);

        let mut inner = self.inner.write().await;
        if inner.by_hash.contains_key(&hash) {
            return Err(MempoolError::AlreadyExists);
        }
        if inner.by_hash.len() >= self.config.max_size {
            return Err(MempoolError::PoolFull);
        }
        let sender = tx.public_key;
        if inner
            .by_sender
            .get(&sender)
            .map_or(0, HashSet::len)
            >= self.config.max_per_sender
        {
            return Err(MempoolError::SenderLimitReached);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .by_sender
            .entry(sender.clone())
            .or_default()
            .insert(hash);
        inner.by_seq.insert(seq, hash);
        inner.by_hash.insert(
            hash,
            PendingTransaction {
                raw,
                hash,
                sender,
                seq,
            },
        );

        debug!("Added transaction {} to mempool", hash);
        Ok(hash)
    }

    /// Remove a transaction from the mempool
    pub async fn remove(&self, hash: &Hash) -> Option<Vec<u8>> {
        let removed = self.inner.write().await.remove(hash);
        if removed.is_some() {
            debug!("Removed transaction {} from mempool", hash);
        }
        removed.map(|p| p.raw)
    }

    pub async fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().await.by_hash.contains_key(hash)
    }

    /// Up to `max_count` transactions in admission order, left in the pool
    pub async fn get_transactions(&self, max_count: usize) -> Vec<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .by_seq
            .values()
            .take(max_count)
            .filter_map(|hash| inner.by_hash.get(hash).map(|p| p.raw.clone()))
            .collect()
    }

    /// Remove and return up to `max_count` transactions in admission order
    pub async fn take(&self, max_count: usize) -> Vec<Vec<u8>> {
        let mut inner = self.inner.write().await;
        let hashes: Vec<Hash> = inner.by_seq.values().take(max_count).copied().collect();
        hashes
            .iter()
            .filter_map(|hash| inner.remove(hash).map(|p| p.raw))
            .collect()
    }

    /// Remove transactions that have been included in a block
    pub async fn remove_committed(&self, tx_hashes: &[Hash]) {
        let mut inner = self.inner.write().await;
        for hash in tx_hashes {
            inner.remove(hash);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_hash.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirauth_core::testutil::TestNode;

    fn mempool(config: MempoolConfig) -> (Codec, Mempool) {
        let codec = Codec::canonical();
        (codec, Mempool::new(config, codec))
    }

    #[tokio::test]
    async fn test_add_and_take_in_order() {
        let (codec, mempool) = mempool(MempoolConfig::default());
        let txs: Vec<Vec<u8>> = (0..3)
            .map(|i| TestNode::mix(&codec, &format!("mix{}", i), 1).publish_tx(&codec, 1))
            .collect();
        for tx in &txs {
            mempool.add(tx.clone()).await.unwrap();
        }
        assert_eq!(mempool.len().await, 3);
        assert_eq!(mempool.get_transactions(2).await, txs[..2].to_vec());

        assert_eq!(mempool.take(2).await, txs[..2].to_vec());
        assert_eq!(mempool.take(5).await, txs[2..].to_vec());
        assert!(mempool.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_rejection() {
        let (codec, mempool) = mempool(MempoolConfig::default());
        let tx = TestNode::mix(&codec, "mix", 1).publish_tx(&codec, 1);

        mempool.add(tx.clone()).await.unwrap();
        assert_eq!(mempool.add(tx).await, Err(MempoolError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_remove() {
        let (codec, mempool) = mempool(MempoolConfig::default());
        let tx = TestNode::mix(&codec, "mix", 1).publish_tx(&codec, 1);
        let hash = mempool.add(tx.clone()).await.unwrap();
        assert_eq!(hash, tx_hash(&tx));
        assert!(mempool.contains(&hash).await);

        assert_eq!(mempool.remove(&hash).await, Some(tx));
        assert!(!mempool.contains(&hash).await);
        assert_eq!(mempool.remove(&hash).await, None);
    }

    #[tokio::test]
    async fn test_limits() {
        let (codec, mempool) = mempool(MempoolConfig {
            max_size: 3,
            max_per_sender: 2,
        });
        let node = TestNode::mix(&codec, "mix", 1);
        mempool.add(node.publish_tx(&codec, 1)).await.unwrap();
        mempool.add(node.publish_tx(&codec, 2)).await.unwrap();
        assert_eq!(
            mempool.add(node.publish_tx(&codec, 3)).await,
            Err(MempoolError::SenderLimitReached)
        );

        let other = TestNode::mix(&codec, "other", 1);
        mempool.add(other.publish_tx(&codec, 1)).await.unwrap();
        assert_eq!(
            mempool.add(other.publish_tx(&codec, 2)).await,
            Err(MempoolError::PoolFull)
        );
    }

    #[tokio::test]
    async fn test_rejects_garbage() {
        let (_, mempool) = mempool(MempoolConfig::default());
        assert_eq!(
            mempool.add(b"not a tx".to_vec()).await,
            Err(MempoolError::InvalidTransaction)
        );
    }
}
