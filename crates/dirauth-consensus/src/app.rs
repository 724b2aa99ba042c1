use std::sync::Arc;

use dirauth_core::epoch::epoch_field;
use dirauth_core::{Authority, Command, PublicKey, Query, PROTOCOL_VERSION};
use dirauth_state::{LedgerState, StateError, Storage};
use dirauth_tx::{AuthorizationPolicy, Executor, TxError};
use tracing::{debug, error, info, warn};

use crate::error::{ConsensusError, QueryError};
use crate::types::{
    EvidenceKind, RequestBeginBlock, RequestInitChain, RequestQuery, ResponseCheckTx,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain,
    ResponseQuery, CODE_OK,
};

pub const APP_VERSION: u64 = 1;
const GENESIS_AUTHORITY_NAME: &str = "dirauth";

/// The block-processing application driven by the consensus engine
pub struct Application<S: Storage> {
    state: Arc<LedgerState<S>>,
    executor: Executor<S>,
}

impl<S: Storage> Application<S> {
    pub fn new(state: Arc<LedgerState<S>>) -> Self {
        Application {
            executor: Executor::new(state.clone()),
            state,
        }
    }

    pub fn with_policy(state: Arc<LedgerState<S>>, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        Application {
            executor: Executor::with_policy(state.clone(), policy),
            state,
        }
    }

    pub fn state(&self) -> &Arc<LedgerState<S>> {
        &self.state
    }

    pub fn info(&self) -> ResponseInfo {
        ResponseInfo {
            data: hex::encode(epoch_field(self.state.current_epoch())),
            version: format!("{}/{}", PROTOCOL_VERSION, env!("CARGO_PKG_VERSION")),
            app_version: APP_VERSION,
            last_block_height: self.state.block_height(),
            last_block_app_hash: self.state.app_hash(),
        }
    }

    /// Seed the genesis authority set. Only valid before the first commit.
    pub fn init_chain(&self, req: RequestInitChain) -> Result<ResponseInitChain, ConsensusError> {
        let authorities: Vec<Authority> = req
            .validators
            .iter()
            .map(|v| Authority::new(GENESIS_AUTHORITY_NAME, &v.pub_key, v.power))
            .collect();
        match self.state.init_genesis(&authorities) {
            Ok(app_hash) => Ok(ResponseInitChain { app_hash }),
            Err(StateError::GenesisInitialized) => Err(ConsensusError::InitChainAfterGenesis),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate without staging anything
    pub fn check_tx(&self, raw: &[u8]) -> ResponseCheckTx {
        match self.executor.validate(raw) {
            Ok(_) => ResponseCheckTx {
                code: CODE_OK,
                log: String::new(),
                gas_wanted: 1,
            },
            Err(e) => ResponseCheckTx {
                code: e.code(),
                log: e.to_string(),
                gas_wanted: 1,
            },
        }
    }

    pub fn deliver_tx(&self, raw: &[u8]) -> ResponseDeliverTx {
        match self.executor.deliver(raw) {
            Ok(validated) => {
                debug!("Delivered tx {}", validated.hash);
                ResponseDeliverTx {
                    code: CODE_OK,
                    log: String::new(),
                }
            }
            Err(e) => tx_failure(e),
        }
    }

    /// Start a block, punishing authorities named in duplicate-vote evidence
    pub fn begin_block(&self, req: &RequestBeginBlock) {
        self.state.begin_block();

        for evidence in &req.byzantine_validators {
            if evidence.kind != EvidenceKind::DuplicateVote {
                continue;
            }
            let Some(authority) = self.state.authority_by_address(&evidence.address) else {
                error!(
                    "Wanted to punish validator {}, but can't find it",
                    evidence.address
                );
                continue;
            };
            let pub_key = match PublicKey::from_slice(&authority.pub_key) {
                Ok(pk) => pk,
                Err(e) => {
                    error!("Stored authority {} has a bad key: {}", evidence.address, e);
                    continue;
                }
            };
            match self.state.set_authority_power(&pub_key, authority.power - 1) {
                Ok(()) => error!(
                    "Decreased power of validator {} by 1 because of equivocation",
                    evidence.address
                ),
                Err(e) => error!("Failed to punish validator {}: {}", evidence.address, e),
            }
        }
    }

    pub fn end_block(&self) -> ResponseEndBlock {
        ResponseEndBlock {
            validator_updates: self.state.validator_updates(),
        }
    }

    pub fn commit(&self) -> Result<ResponseCommit, ConsensusError> {
        let outcome = self.state.commit()?;
        if let Some(err) = &outcome.document_error {
            if err.is_recoverable() {
                warn!("Document for epoch {} not generated: {}", outcome.epoch, err);
            } else {
                error!("Document for epoch {} not generated: {}", outcome.epoch, err);
            }
        }
        Ok(ResponseCommit {
            data: outcome.app_hash,
            height: outcome.height,
            epoch: outcome.epoch,
        })
    }

    pub fn query(&self, req: &RequestQuery) -> ResponseQuery {
        match self.run_query(req) {
            Ok(resp) => resp,
            Err(e) => ResponseQuery {
                code: e.code(),
                log: e.to_string(),
                ..ResponseQuery::default()
            },
        }
    }

    fn run_query(&self, req: &RequestQuery) -> Result<ResponseQuery, QueryError> {
        if self.state.is_closed() {
            return Err(QueryError::StateClosed);
        }
        let query = Query::decode(self.state.codec(), &req.data)
            .map_err(|_| QueryError::InvalidFormat)?;

        let (key, proven) = match Command::try_from(query.command) {
            Ok(Command::GetEpoch) => {
                let proven = self.state.latest_epoch(req.height).map_err(|e| {
                    error!("Failed to retrieve epoch for height {}: {}", req.height, e);
                    match e {
                        StateError::Closed => QueryError::StateClosed,
                        _ => QueryError::EpochFailed,
                    }
                })?;
                (dirauth_state::keys::EPOCH_INFO_KEY.to_vec(), proven)
            }
            Ok(Command::GetConsensus) => {
                let proven = self
                    .state
                    .document_for_epoch(query.epoch, req.height)
                    .map_err(|e| {
                        debug!(
                            "Failed to retrieve document for epoch {} (current {}): {}",
                            query.epoch,
                            self.state.current_epoch(),
                            e
                        );
                        match e {
                            StateError::NoDocument(_) => QueryError::NoDocument,
                            StateError::DocumentNotReady(_) => QueryError::DocumentNotReady,
                            StateError::Closed => QueryError::StateClosed,
                            _ => QueryError::DocumentUnknown,
                        }
                    })?;
                (dirauth_state::keys::document_key(query.epoch), proven)
            }
            _ => return Err(QueryError::Unsupported),
        };

        Ok(ResponseQuery {
            code: CODE_OK,
            log: String::new(),
            key,
            value: proven.value,
            proof: Some(proven.proof),
            height: proven.height,
            app_hash: Some(proven.root),
        })
    }

    /// Refuse further queries
    pub fn close(&self) {
        info!("Closing application state");
        self.state.close();
    }
}

fn tx_failure(e: TxError) -> ResponseDeliverTx {
    ResponseDeliverTx {
        code: e.code(),
        log: e.to_string(),
    }
}
