use std::sync::Arc;

use async_trait::async_trait;
use dirauth_core::{Document, KeyPair, MixDescriptor};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Epoch in preparation and how many blocks it has been running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochInfo {
    pub epoch: u64,
    pub elapsed_height: u64,
}

/// A verified document together with the bytes it was parsed from
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    pub document: Document,
    pub raw: Vec<u8>,
}

impl DocumentEntry {
    pub fn epoch(&self) -> u64 {
        self.document.epoch
    }
}

/// Read and publish access to the directory
#[async_trait]
pub trait PkiClient: Send + Sync {
    async fn get_epoch(&self, ctx: &CancellationToken) -> Result<EpochInfo, ClientError>;

    async fn get_doc(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
    ) -> Result<Arc<DocumentEntry>, ClientError>;

    /// Sign `descriptor` for `epoch` and submit it
    async fn post(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
        signer: &KeyPair,
        descriptor: &MixDescriptor,
    ) -> Result<(), ClientError>;

    fn deserialize(&self, raw: &[u8]) -> Result<Document, ClientError>;

    async fn shutdown(&self);
}

/// Run `fut` unless `ctx` is cancelled first
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, ClientError>
where
    F: std::future::Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        _ = ctx.cancelled() => Err(ClientError::Cancelled),
        res = fut => res,
    }
}
