//! Caching wrapper around another [`PkiClient`].
//!
//! Documents live in a small LRU. Misses are queued to one background
//! worker, so at most one upstream fetch runs at a time and the cache lock
//! is never held across I/O.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dirauth_core::{Document, KeyPair, MixDescriptor};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{cancellable, DocumentEntry, EpochInfo, PkiClient};
use crate::error::ClientError;

pub const DEFAULT_CACHE_CAPACITY: usize = 8;
pub const DEFAULT_FETCH_BACKLOG: usize = 8;

/// Whether `post` is forwarded upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub fetch_backlog: usize,
    /// Bound on the initial epoch fetch
    pub handshake_timeout: Duration,
    /// How often the worker refreshes the epoch memo
    pub refresh_interval: Duration,
    pub mode: PostMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: DEFAULT_CACHE_CAPACITY,
            fetch_backlog: DEFAULT_FETCH_BACKLOG,
            handshake_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(1),
            mode: PostMode::ReadWrite,
        }
    }
}

type FetchResult = Result<Arc<DocumentEntry>, ClientError>;

struct FetchOp {
    epoch: u64,
    reply: oneshot::Sender<FetchResult>,
}

struct Shared {
    docs: Mutex<LruCache<u64, Arc<DocumentEntry>>>,
    memo: Mutex<EpochInfo>,
}

impl Shared {
    fn get(&self, epoch: u64) -> Option<Arc<DocumentEntry>> {
        self.docs.lock().get(&epoch).cloned()
    }

    fn insert(&self, entry: Arc<DocumentEntry>) {
        self.docs.lock().put(entry.epoch(), entry);
    }
}

pub struct CachingClient<C: PkiClient + 'static> {
    inner: Arc<C>,
    shared: Arc<Shared>,
    queue: mpsc::Sender<FetchOp>,
    halt: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    mode: PostMode,
}

impl<C: PkiClient + 'static> CachingClient<C> {
    /// Wrap `inner`, fetching the current epoch once before returning
    pub async fn new(inner: C, config: CacheConfig) -> Result<Self, ClientError> {
        let inner = Arc::new(inner);
        let ctx = CancellationToken::new();
        let memo = tokio::time::timeout(config.handshake_timeout, inner.get_epoch(&ctx))
            .await
            .map_err(|_| ClientError::HandshakeTimeout)??;
        info!(
            "Directory at epoch {} ({} blocks in)",
            memo.epoch, memo.elapsed_height
        );

        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let shared = Arc::new(Shared {
            docs: Mutex::new(LruCache::new(capacity)),
            memo: Mutex::new(memo),
        });
        let (queue, rx) = mpsc::channel(config.fetch_backlog.max(1));
        let (halt, halt_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            Arc::clone(&inner),
            Arc::clone(&shared),
            rx,
            halt_rx,
            config.refresh_interval,
        ));

        Ok(CachingClient {
            inner,
            shared,
            queue,
            halt,
            worker: Mutex::new(Some(worker)),
            mode: config.mode,
        })
    }

    pub fn is_halted(&self) -> bool {
        *self.halt.borrow()
    }

    /// Stop the worker; queued and later requests fail with `Halted`
    pub fn halt(&self) {
        self.halt.send_replace(true);
    }

    /// Number of cached documents
    pub fn cached(&self) -> usize {
        self.shared.docs.lock().len()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: PkiClient + 'static> PkiClient for CachingClient<C> {
    async fn get_epoch(&self, _ctx: &CancellationToken) -> Result<EpochInfo, ClientError> {
        if self.is_halted() {
            return Err(ClientError::Halted);
        }
        Ok(*self.shared.memo.lock())
    }

    async fn get_doc(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
    ) -> Result<Arc<DocumentEntry>, ClientError> {
        if let Some(entry) = self.shared.get(epoch) {
            return Ok(entry);
        }
        if self.is_halted() {
            return Err(ClientError::Halted);
        }

        let (reply, rx) = oneshot::channel();
        cancellable(ctx, async {
            self.queue
                .send(FetchOp { epoch, reply })
                .await
                .map_err(|_| ClientError::Halted)
        })
        .await?;
        // A cancelled caller stops waiting; the worker still finishes the fetch.
        cancellable(ctx, async { rx.await.unwrap_or(Err(ClientError::Halted)) }).await
    }

    async fn post(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
        signer: &KeyPair,
        descriptor: &MixDescriptor,
    ) -> Result<(), ClientError> {
        match self.mode {
            PostMode::ReadOnly => Err(ClientError::ReadOnly),
            PostMode::ReadWrite => self.inner.post(ctx, epoch, signer, descriptor).await,
        }
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Document, ClientError> {
        self.inner.deserialize(raw)
    }

    async fn shutdown(&self) {
        self.halt();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Cache worker ended abnormally: {}", e);
            }
        }
        self.inner.shutdown().await;
    }
}

async fn run_worker<C: PkiClient>(
    inner: Arc<C>,
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<FetchOp>,
    mut halt: watch::Receiver<bool>,
    refresh: Duration,
) {
    let mut ticker = interval_at(Instant::now() + refresh, refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Upstream work is never tied to a caller's token.
    let ctx = CancellationToken::new();

    loop {
        tokio::select! {
            biased;
            _ = wait_halted(&mut halt) => break,
            op = rx.recv() => {
                let Some(op) = op else { break };
                // An earlier queued fetch may have filled the entry.
                let result = match shared.get(op.epoch) {
                    Some(entry) => Ok(entry),
                    None => fetch(inner.as_ref(), &shared, &ctx, op.epoch).await,
                };
                let _ = op.reply.send(result);
            }
            _ = ticker.tick() => {
                match inner.get_epoch(&ctx).await {
                    Ok(info) => {
                        let mut memo = shared.memo.lock();
                        if info.epoch != memo.epoch {
                            debug!("Directory moved to epoch {}", info.epoch);
                        }
                        *memo = info;
                    }
                    Err(e) => debug!("Epoch refresh failed: {}", e),
                }
            }
        }
    }

    rx.close();
    let mut drained = 0;
    while let Ok(op) = rx.try_recv() {
        let _ = op.reply.send(Err(ClientError::Halted));
        drained += 1;
    }
    debug!("Cache worker halted, failed {} queued fetches", drained);
}

/// Resolve once the halt flag is set. The borrowed flag is released
/// before returning so the worker future stays `Send`.
async fn wait_halted(halt: &mut watch::Receiver<bool>) {
    let _ = halt.wait_for(|halted| *halted).await;
}

async fn fetch<C: PkiClient>(
    inner: &C,
    shared: &Shared,
    ctx: &CancellationToken,
    epoch: u64,
) -> FetchResult {
    let entry = inner.get_doc(ctx, epoch).await?;
    shared.insert(Arc::clone(&entry));
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirauth_core::{Codec, Parameters};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct MockPki {
        fetches: AtomicUsize,
        posts: AtomicUsize,
        /// Each fetch takes one permit
        gate: Semaphore,
        failing: Mutex<Vec<u64>>,
        epoch_delay: Duration,
    }

    impl MockPki {
        fn new() -> Self {
            MockPki {
                fetches: AtomicUsize::new(0),
                posts: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
                failing: Mutex::new(Vec::new()),
                epoch_delay: Duration::ZERO,
            }
        }

        fn gated() -> Self {
            MockPki {
                gate: Semaphore::new(0),
                ..Self::new()
            }
        }
    }

    fn document(epoch: u64) -> Arc<DocumentEntry> {
        Arc::new(DocumentEntry {
            document: Document {
                epoch,
                genesis_epoch: 1,
                parameters: Parameters::default(),
                topology: vec![],
                providers: vec![],
            },
            raw: epoch.to_be_bytes().to_vec(),
        })
    }

    #[async_trait]
    impl PkiClient for MockPki {
        async fn get_epoch(&self, _ctx: &CancellationToken) -> Result<EpochInfo, ClientError> {
            tokio::time::sleep(self.epoch_delay).await;
            Ok(EpochInfo {
                epoch: 3,
                elapsed_height: 2,
            })
        }

        async fn get_doc(
            &self,
            _ctx: &CancellationToken,
            epoch: u64,
        ) -> Result<Arc<DocumentEntry>, ClientError> {
            self.gate
                .acquire()
                .await
                .map_err(|_| ClientError::Halted)?
                .forget();
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().contains(&epoch) {
                return Err(ClientError::NoDocument(epoch));
            }
            Ok(document(epoch))
        }

        async fn post(
            &self,
            _ctx: &CancellationToken,
            _epoch: u64,
            _signer: &KeyPair,
            _descriptor: &MixDescriptor,
        ) -> Result<(), ClientError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn deserialize(&self, raw: &[u8]) -> Result<Document, ClientError> {
            Ok(dirauth_core::verify_and_parse_document(&Codec::canonical(), raw)?)
        }

        async fn shutdown(&self) {}
    }

    fn config() -> CacheConfig {
        CacheConfig {
            refresh_interval: Duration::from_secs(3600),
            ..CacheConfig::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_worker_future_is_send() {
        let shared = Arc::new(Shared {
            docs: Mutex::new(LruCache::new(NonZeroUsize::MIN)),
            memo: Mutex::new(EpochInfo::default()),
        });
        let (_queue, rx) = mpsc::channel(1);
        let (halt, halt_rx) = watch::channel(false);
        let worker = run_worker(
            Arc::new(MockPki::new()),
            shared,
            rx,
            halt_rx,
            Duration::from_secs(3600),
        );
        assert_send(&worker);

        halt.send_replace(true);
        tokio::spawn(worker).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let client = CachingClient::new(MockPki::new(), config()).await.unwrap();
        let ctx = CancellationToken::new();

        let first = client.get_doc(&ctx, 5).await.unwrap();
        let second = client.get_doc(&ctx, 5).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.inner().fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lru_evicts_oldest() {
        let client = CachingClient::new(MockPki::new(), config()).await.unwrap();
        let ctx = CancellationToken::new();

        for epoch in 1..=8 {
            client.get_doc(&ctx, epoch).await.unwrap();
        }
        // Touch epoch 1 so epoch 2 becomes the oldest.
        client.get_doc(&ctx, 1).await.unwrap();
        client.get_doc(&ctx, 9).await.unwrap();
        assert_eq!(client.cached(), DEFAULT_CACHE_CAPACITY);
        assert_eq!(client.inner().fetches.load(Ordering::SeqCst), 9);

        client.get_doc(&ctx, 1).await.unwrap();
        assert_eq!(client.inner().fetches.load(Ordering::SeqCst), 9);
        client.get_doc(&ctx, 2).await.unwrap();
        assert_eq!(client.inner().fetches.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_failure_reaches_only_its_waiter() {
        let mock = MockPki::new();
        mock.failing.lock().push(4);
        let client = CachingClient::new(mock, config()).await.unwrap();
        let ctx = CancellationToken::new();

        assert!(matches!(
            client.get_doc(&ctx, 4).await,
            Err(ClientError::NoDocument(4))
        ));
        assert_eq!(client.cached(), 0);
        // The worker survives and serves the next request.
        assert!(client.get_doc(&ctx, 5).await.is_ok());

        client.inner().failing.lock().clear();
        assert!(client.get_doc(&ctx, 4).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_wait_still_caches() {
        let client = Arc::new(CachingClient::new(MockPki::gated(), config()).await.unwrap());
        let ctx = CancellationToken::new();

        let waiter = {
            let client = Arc::clone(&client);
            let ctx = ctx.clone();
            tokio::spawn(async move { client.get_doc(&ctx, 7).await })
        };
        settle().await;
        ctx.cancel();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(ClientError::Cancelled)
        ));

        client.inner().gate.add_permits(1);
        settle().await;
        assert_eq!(client.cached(), 1);
        let fresh = CancellationToken::new();
        assert_eq!(client.get_doc(&fresh, 7).await.unwrap().epoch(), 7);
        assert_eq!(client.inner().fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_halt_fails_queued_and_new_requests() {
        let client = Arc::new(CachingClient::new(MockPki::gated(), config()).await.unwrap());

        let spawn_get = |epoch: u64| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_doc(&CancellationToken::new(), epoch).await })
        };
        let in_flight = spawn_get(1);
        settle().await;
        let queued = spawn_get(2);
        settle().await;

        client.halt();
        client.inner().gate.add_permits(1);

        assert!(in_flight.await.unwrap().is_ok());
        assert!(matches!(queued.await.unwrap(), Err(ClientError::Halted)));

        let ctx = CancellationToken::new();
        assert!(matches!(
            client.get_doc(&ctx, 3).await,
            Err(ClientError::Halted)
        ));
        assert!(matches!(
            client.get_epoch(&ctx).await,
            Err(ClientError::Halted)
        ));
        // Cached entries stay readable.
        assert!(client.get_doc(&ctx, 1).await.is_ok());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_epoch_memo() {
        let client = CachingClient::new(MockPki::new(), config()).await.unwrap();
        let info = client.get_epoch(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            info,
            EpochInfo {
                epoch: 3,
                elapsed_height: 2
            }
        );
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let mock = MockPki {
            epoch_delay: Duration::from_secs(60),
            ..MockPki::new()
        };
        let config = CacheConfig {
            handshake_timeout: Duration::from_millis(20),
            ..config()
        };
        assert!(matches!(
            CachingClient::new(mock, config).await,
            Err(ClientError::HandshakeTimeout)
        ));
    }

    #[tokio::test]
    async fn test_post_modes() {
        let codec = Codec::canonical();
        let node = dirauth_core::testutil::TestNode::mix(&codec, "mix", 3);
        let ctx = CancellationToken::new();

        let rw = CachingClient::new(MockPki::new(), config()).await.unwrap();
        rw.post(&ctx, 3, &node.keys, &node.descriptor).await.unwrap();
        assert_eq!(rw.inner().posts.load(Ordering::SeqCst), 1);

        let ro = CachingClient::new(
            MockPki::new(),
            CacheConfig {
                mode: PostMode::ReadOnly,
                ..config()
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            ro.post(&ctx, 3, &node.keys, &node.descriptor).await,
            Err(ClientError::ReadOnly)
        ));
        assert_eq!(ro.inner().posts.load(Ordering::SeqCst), 0);
    }
}
