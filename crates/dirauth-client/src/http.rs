//! [`PkiClient`] talking to a node's RPC bridge.

use std::sync::Arc;

use async_trait::async_trait;
use dirauth_consensus::{QueryError, RequestQuery, RequestTx, ResponseQuery};
use dirauth_core::{
    is_descriptor_well_formed, sign_descriptor_for_epoch, verify_and_parse_document,
    verify_merkle_proof, Codec, Command, Document, EpochRecord, Hash, KeyPair, MixDescriptor,
    Query, Transaction,
};
use dirauth_rpc::{AppHashResponse, BroadcastResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{cancellable, DocumentEntry, EpochInfo, PkiClient};
use crate::error::ClientError;

/// Trusted source of the app hash committed at a height
#[async_trait]
pub trait AppHashSource: Send + Sync {
    async fn app_hash(&self, height: u64) -> Result<Hash, ClientError>;
}

/// Asks the same node's `/status/app_hash/{height}` route
pub struct RpcAppHashSource {
    http: reqwest::Client,
    base_url: String,
}

impl RpcAppHashSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        RpcAppHashSource {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AppHashSource for RpcAppHashSource {
    async fn app_hash(&self, height: u64) -> Result<Hash, ClientError> {
        let url = format!("{}/status/app_hash/{}", self.base_url, height);
        let resp: AppHashResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if resp.height != height {
            return Err(ClientError::Malformed(format!(
                "app hash for height {} returned, expected {}",
                resp.height, height
            )));
        }
        Ok(resp.app_hash)
    }
}

pub struct HttpPkiClient {
    http: reqwest::Client,
    base_url: String,
    codec: Codec,
    roots: Arc<dyn AppHashSource>,
}

impl HttpPkiClient {
    /// Client that checks proofs against roots served by the same node
    pub fn new(base_url: impl Into<String>, codec: Codec) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::new();
        let roots = Arc::new(RpcAppHashSource::new(http.clone(), base_url.clone()));
        HttpPkiClient {
            http,
            base_url,
            codec,
            roots,
        }
    }

    pub fn with_roots(mut self, roots: Arc<dyn AppHashSource>) -> Self {
        self.roots = roots;
        self
    }

    /// Query and verify the proof of the returned value
    async fn query(&self, epoch: u64, command: Command) -> Result<ResponseQuery, ClientError> {
        let request = RequestQuery {
            data: Query::new(command, epoch).encode(&self.codec)?,
            height: 0,
        };
        let resp: ResponseQuery = self
            .http
            .post(format!("{}/query", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.is_ok() {
            return Err(match QueryError::from_code(resp.code) {
                Some(QueryError::NoDocument) => ClientError::NoDocument(epoch),
                _ => ClientError::Query {
                    code: resp.code,
                    log: resp.log,
                },
            });
        }

        let proof = resp
            .proof
            .as_ref()
            .ok_or_else(|| ClientError::InvalidProof("response carries no proof".to_string()))?;
        if proof.key != resp.key || proof.value != resp.value {
            return Err(ClientError::InvalidProof(
                "proof does not cover the returned value".to_string(),
            ));
        }
        let root = self.roots.app_hash(resp.height).await?;
        if !verify_merkle_proof(proof, &root) {
            return Err(ClientError::InvalidProof(format!(
                "proof does not match app hash at height {}",
                resp.height
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl PkiClient for HttpPkiClient {
    async fn get_epoch(&self, ctx: &CancellationToken) -> Result<EpochInfo, ClientError> {
        debug!("Query epoch");
        let resp = cancellable(ctx, self.query(0, Command::GetEpoch)).await?;
        let record = EpochRecord::decode(&resp.value)?;
        if record.start_height > resp.height {
            return Err(ClientError::Malformed(
                "epoch starts after the height it was read at".to_string(),
            ));
        }
        Ok(EpochInfo {
            epoch: record.epoch,
            elapsed_height: resp.height - record.start_height,
        })
    }

    async fn get_doc(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
    ) -> Result<Arc<DocumentEntry>, ClientError> {
        debug!("Get document for epoch {}", epoch);
        let resp = cancellable(ctx, self.query(epoch, Command::GetConsensus)).await?;
        let document = verify_and_parse_document(&self.codec, &resp.value)?;
        if document.epoch != epoch {
            warn!("Returned document for wrong epoch: {}", document.epoch);
            return Err(ClientError::InvalidEpoch {
                expected: epoch,
                got: document.epoch,
            });
        }
        debug!(
            "Document summary: {} layers, {} providers",
            document.topology.len(),
            document.providers.len()
        );
        Ok(Arc::new(DocumentEntry {
            document,
            raw: resp.value,
        }))
    }

    async fn post(
        &self,
        ctx: &CancellationToken,
        epoch: u64,
        signer: &KeyPair,
        descriptor: &MixDescriptor,
    ) -> Result<(), ClientError> {
        debug!("Post descriptor for epoch {}", epoch);
        is_descriptor_well_formed(descriptor, epoch)?;
        let signed = sign_descriptor_for_epoch(&self.codec, signer, descriptor, epoch)?;
        let tx = Transaction::sign_new(
            &self.codec,
            signer,
            Command::PublishMixDescriptor,
            epoch,
            hex::encode(signed),
        )?
        .encode(&self.codec)?;

        let resp: BroadcastResponse = cancellable(ctx, async {
            Ok(self
                .http
                .post(format!("{}/broadcast_tx", self.base_url))
                .json(&RequestTx { tx })
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?)
        })
        .await?;
        if !resp.is_ok() {
            return Err(ClientError::Rejected {
                code: resp.code,
                log: resp.log,
            });
        }
        Ok(())
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Document, ClientError> {
        Ok(verify_and_parse_document(&self.codec, raw)?)
    }

    async fn shutdown(&self) {
        debug!("Shutting down directory client for {}", self.base_url);
    }
}
