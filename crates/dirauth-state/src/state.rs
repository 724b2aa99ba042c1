use std::collections::BTreeMap;
use std::sync::Arc;

use dirauth_core::{
    verify_and_parse_authority, verify_and_parse_document, Address, Authority, Codec, Document,
    EpochRecord, Hash, MerkleProof, MixDescriptor, Parameters, PublicKey, ValidatorUpdate,
    GENESIS_EPOCH,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::generator::{generate, GenerateError, GeneratorConfig};
use crate::keys::{
    authorities_prefix, authority_key, bucket_prefix, descriptor_key, document_key,
    unpack_storage_key, DESCRIPTORS_BUCKET, EPOCH_INFO_KEY,
};
use crate::storage::{Entries, Storage};
use crate::tree::{TreeVersion, VersionedTree};

pub const DEFAULT_LAYERS: usize = 3;
pub const DEFAULT_MIN_NODES_PER_LAYER: usize = 2;
pub const DEFAULT_EPOCH_INTERVAL: u64 = 5;
pub const DEFAULT_LIFE_CYCLE: u64 = 3;
pub const DEFAULT_RETAIN_VERSIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub layers: usize,
    pub min_nodes_per_layer: usize,
    /// Blocks per epoch
    pub epoch_interval: u64,
    /// Number of epochs, starting at the current one, open for uploads
    pub life_cycle: u64,
    pub parameters: Parameters,
    /// Committed versions kept for proofs, 0 keeps all
    pub retain_versions: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            layers: DEFAULT_LAYERS,
            min_nodes_per_layer: DEFAULT_MIN_NODES_PER_LAYER,
            epoch_interval: DEFAULT_EPOCH_INTERVAL,
            life_cycle: DEFAULT_LIFE_CYCLE,
            parameters: Parameters::default(),
            retain_versions: DEFAULT_RETAIN_VERSIONS,
        }
    }
}

impl LedgerConfig {
    fn generator(&self) -> GeneratorConfig {
        GeneratorConfig {
            layers: self.layers,
            min_nodes_per_layer: self.min_nodes_per_layer,
            parameters: self.parameters.clone(),
        }
    }
}

/// Result of a block commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub app_hash: Hash,
    pub height: u64,
    pub epoch: u64,
    /// Set only when generation failed differently than on the previous commit
    pub document_error: Option<GenerateError>,
}

/// A committed value with its inclusion proof
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenValue {
    pub value: Vec<u8>,
    pub proof: MerkleProof,
    pub height: u64,
    pub root: Hash,
}

struct StateInner<S: Storage> {
    storage: S,
    tree: VersionedTree,
    /// Writes of the block in progress; `None` marks a delete
    staging: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    app_hash: Hash,
    block_height: u64,
    current_epoch: u64,
    epoch_start_height: u64,
    validators: BTreeMap<Address, Authority>,
    validator_updates: Vec<ValidatorUpdate>,
    prev_document: Option<Document>,
    last_commit_error: Option<GenerateError>,
    closed: bool,
}

impl<S: Storage> StateInner<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.staging.get(key) {
            Some(staged) => staged.clone(),
            None => self.tree.latest().get(key).map(<[u8]>::to_vec),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staging.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        let existed = self.get(key).is_some();
        self.staging.insert(key.to_vec(), None);
        existed
    }

    /// Whether committing `height` closes the current epoch
    fn document_due_at(&self, height: u64, config: &LedgerConfig) -> bool {
        height + 1 >= self.epoch_start_height + config.epoch_interval
    }

    fn version_at(&self, height: u64) -> Result<Arc<TreeVersion>, StateError> {
        if height == 0 {
            return Ok(self.tree.latest());
        }
        self.tree
            .at(height)
            .ok_or(StateError::VersionNotFound(height))
    }
}

/// Store `raw` under `key` unless a different document is already there.
/// Returns false when the identical document was already present.
pub(crate) fn update_document(
    entries: &mut Entries,
    key: Vec<u8>,
    raw: &[u8],
    epoch: u64,
) -> Result<bool, GenerateError> {
    match entries.get(&key) {
        Some(existing) if existing.as_slice() == raw => Ok(false),
        Some(_) => Err(GenerateError::Conflict(epoch)),
        None => {
            entries.insert(key, raw.to_vec());
            Ok(true)
        }
    }
}

/// The replicated ledger: a staged, versioned key/value tree plus epoch
/// and authority bookkeeping.
pub struct LedgerState<S: Storage> {
    codec: Codec,
    config: LedgerConfig,
    inner: Mutex<StateInner<S>>,
}

impl<S: Storage> LedgerState<S> {
    /// Open the ledger, restoring the last saved version from `storage`
    pub fn open(codec: Codec, config: LedgerConfig, storage: S) -> Result<Self, StateError> {
        let mut inner = StateInner {
            storage,
            tree: VersionedTree::new(config.retain_versions),
            staging: BTreeMap::new(),
            app_hash: Hash::ZERO,
            block_height: 0,
            current_epoch: GENESIS_EPOCH,
            epoch_start_height: 0,
            validators: BTreeMap::new(),
            validator_updates: Vec::new(),
            prev_document: None,
            last_commit_error: None,
            closed: false,
        };

        if let Some((version, entries)) = inner.storage.load()? {
            inner.tree = VersionedTree::restore(config.retain_versions, version, entries);
            let latest = inner.tree.latest();
            inner.block_height = version;
            inner.app_hash = latest.root();

            let raw = latest.get(EPOCH_INFO_KEY).ok_or_else(|| {
                StateError::CorruptEpochRecord(format!("missing at version {version}"))
            })?;
            let record = EpochRecord::decode(raw)
                .map_err(|e| StateError::CorruptEpochRecord(e.to_string()))?;
            inner.current_epoch = record.epoch;
            inner.epoch_start_height = record.start_height;

            let prev_epoch = record.epoch.saturating_sub(1);
            if let Some(raw) = latest.get(&document_key(prev_epoch)) {
                match verify_and_parse_document(&codec, raw) {
                    Ok(doc) => inner.prev_document = Some(doc),
                    Err(e) => warn!("Stored document for epoch {} failed to parse: {}", prev_epoch, e),
                }
            }

            let prefix = authorities_prefix();
            for (key, value) in latest.iter_prefix(&prefix) {
                let (id, _) = unpack_storage_key(key).ok_or_else(|| {
                    StateError::CorruptAuthority(format!("bad key {}", hex::encode(key)))
                })?;
                let (authority, update) = verify_and_parse_authority(&codec, value)
                    .map_err(|e| StateError::CorruptAuthority(e.to_string()))?;
                if id.as_slice() != update.pub_key.as_bytes().as_slice() {
                    return Err(StateError::CorruptAuthority(format!(
                        "key id {} holds authority {}",
                        hex::encode(&id),
                        update.pub_key
                    )));
                }
                inner.validators.insert(update.pub_key.address(), authority);
            }

            info!(
                "Restored ledger at height {} (epoch {}, {} authorities)",
                inner.block_height,
                inner.current_epoch,
                inner.validators.len()
            );
        }

        Ok(LedgerState {
            codec,
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Seed version 0 with the initial authority set. Fails once anything
    /// has been committed or genesis was already seeded.
    pub fn init_genesis(&self, authorities: &[Authority]) -> Result<Hash, StateError> {
        let mut inner = self.inner.lock();
        let latest = inner.tree.latest();
        if inner.block_height != 0
            || inner.current_epoch != GENESIS_EPOCH
            || latest.get(EPOCH_INFO_KEY).is_some()
        {
            return Err(StateError::GenesisInitialized);
        }

        let mut entries = latest.entries().clone();
        let mut validators = BTreeMap::new();
        for authority in authorities {
            let raw = self.codec.encode(authority)?;
            let (authority, update) = verify_and_parse_authority(&self.codec, &raw)?;
            let address = update.pub_key.address();
            if validators.contains_key(&address) {
                return Err(StateError::AuthorityExists(update.pub_key.to_hex()));
            }
            entries.insert(authority_key(&update.pub_key), raw);
            validators.insert(address, authority);
        }
        entries.insert(
            EPOCH_INFO_KEY.to_vec(),
            EpochRecord::genesis().encode()?.to_vec(),
        );

        let version = TreeVersion::new(0, entries);
        inner.storage.save(0, version.entries())?;
        let version = inner.tree.push(version);
        inner.app_hash = version.root();
        inner.validators = validators;
        info!("Seeded genesis with {} authorities", inner.validators.len());
        Ok(inner.app_hash)
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().get(key)
    }

    /// Stage a write for the current block
    pub fn set(&self, key: &[u8], value: &[u8]) {
        self.inner.lock().set(key.to_vec(), value.to_vec());
    }

    /// Stage a delete; returns whether the key was present
    pub fn delete(&self, key: &[u8]) -> bool {
        self.inner.lock().delete(key)
    }

    /// Committed value at `height` (0 for the latest) with its proof
    pub fn get_with_proof(&self, key: &[u8], height: u64) -> Result<Option<ProvenValue>, StateError> {
        let version = self.inner.lock().version_at(height)?;
        Ok(version
            .get_with_proof(key)
            .map(|(value, proof)| ProvenValue {
                value,
                proof,
                height: version.version(),
                root: version.root(),
            }))
    }

    pub fn begin_block(&self) {
        let mut inner = self.inner.lock();
        inner.staging.clear();
        inner.validator_updates.clear();
    }

    /// Merge the block's writes, advance the epoch when due, and save a new
    /// version.
    pub fn commit(&self) -> Result<CommitOutcome, StateError> {
        let mut inner = self.inner.lock();
        let height = inner.block_height + 1;

        let mut entries = inner.tree.latest().entries().clone();
        for (key, value) in std::mem::take(&mut inner.staging) {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }

        let mut epoch = inner.current_epoch;
        let mut start_height = inner.epoch_start_height;
        let mut generated = None;
        let mut failure = None;
        if inner.document_due_at(height, &self.config) {
            let prefix = bucket_prefix(DESCRIPTORS_BUCKET, epoch);
            let descriptors: Vec<Vec<u8>> = entries
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(_, v)| v.clone())
                .collect();
            let result = generate(
                &self.codec,
                &self.config.generator(),
                epoch,
                &descriptors,
                inner.prev_document.as_ref(),
            )
            .and_then(|doc| {
                update_document(&mut entries, document_key(epoch), &doc.raw, epoch)?;
                Ok(doc)
            });
            match result {
                Ok(doc) => {
                    info!("Generated document for epoch {} at height {}", epoch, height);
                    epoch += 1;
                    start_height = height;
                    generated = Some(doc.document);
                }
                Err(e) => failure = Some(e),
            }
        }

        let record = EpochRecord {
            epoch,
            start_height,
        }
        .encode()?;
        entries.insert(EPOCH_INFO_KEY.to_vec(), record.to_vec());

        let version = TreeVersion::new(height, entries);
        inner.storage.save(height, version.entries())?;
        let version = inner.tree.push(version);

        inner.block_height = height;
        inner.app_hash = version.root();
        inner.current_epoch = epoch;
        inner.epoch_start_height = start_height;
        if generated.is_some() {
            inner.prev_document = generated;
        }

        let document_error = match failure {
            Some(e) if inner.last_commit_error.as_ref() == Some(&e) => None,
            Some(e) => {
                inner.last_commit_error = Some(e.clone());
                Some(e)
            }
            None => {
                inner.last_commit_error = None;
                None
            }
        };

        debug!("Committed height {} with app hash {}", height, inner.app_hash);
        Ok(CommitOutcome {
            app_hash: inner.app_hash,
            height,
            epoch,
            document_error,
        })
    }

    /// Whether the next commit will try to produce a document
    pub fn new_document_required(&self) -> bool {
        let inner = self.inner.lock();
        inner.document_due_at(inner.block_height + 1, &self.config)
    }

    /// Stage a descriptor upload for `epoch`. Identical re-uploads are a
    /// no-op; the caller checks the epoch window.
    pub fn update_mix_descriptor(
        &self,
        raw: &[u8],
        desc: &MixDescriptor,
        epoch: u64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let key = descriptor_key(&desc.identity_key, epoch);

        if let Some(existing) = inner.get(&key) {
            if existing.as_slice() != raw {
                return Err(StateError::ConflictingDescriptor {
                    identity: desc.identity_key.to_hex(),
                    epoch,
                });
            }
            return Ok(());
        }
        if epoch < inner.current_epoch {
            return Err(StateError::LateDescriptor {
                identity: desc.identity_key.to_hex(),
                epoch,
            });
        }

        inner.set(key, raw.to_vec());
        Ok(())
    }

    /// Stage a new authority record. `raw` is its encoded form.
    pub fn add_authority(
        &self,
        raw: &[u8],
        authority: &Authority,
        update: ValidatorUpdate,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let address = update.pub_key.address();
        if inner.validators.contains_key(&address) {
            return Err(StateError::AuthorityExists(update.pub_key.to_hex()));
        }
        inner.set(authority_key(&update.pub_key), raw.to_vec());
        inner.validators.insert(address, authority.clone());
        inner.validator_updates.push(update);
        Ok(())
    }

    /// Change an existing authority's voting power; 0 or less removes it.
    pub fn set_authority_power(&self, pub_key: &PublicKey, power: i64) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        let address = pub_key.address();
        let mut authority = inner
            .validators
            .get(&address)
            .cloned()
            .ok_or_else(|| StateError::AuthorityNotFound(pub_key.to_hex()))?;
        let key = authority_key(pub_key);

        let power = power.max(0);
        if power == 0 {
            inner.delete(&key);
            inner.validators.remove(&address);
        } else {
            authority.power = power;
            let raw = self.codec.encode(&authority)?;
            inner.set(key, raw);
            inner.validators.insert(address, authority);
        }
        inner.validator_updates.push(ValidatorUpdate {
            pub_key: *pub_key,
            power,
        });
        Ok(())
    }

    pub fn authority_by_address(&self, address: &Address) -> Option<Authority> {
        self.inner.lock().validators.get(address).cloned()
    }

    pub fn has_authority(&self, pub_key: &PublicKey) -> bool {
        self.inner.lock().validators.contains_key(&pub_key.address())
    }

    pub fn authorities(&self) -> Vec<Authority> {
        self.inner.lock().validators.values().cloned().collect()
    }

    /// Validator changes staged since `begin_block`
    pub fn validator_updates(&self) -> Vec<ValidatorUpdate> {
        self.inner.lock().validator_updates.clone()
    }

    /// The 16-byte epoch record committed at `height` (0 for the latest)
    pub fn latest_epoch(&self, height: u64) -> Result<ProvenValue, StateError> {
        let version = {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(StateError::Closed);
            }
            inner.version_at(height)?
        };
        match version.get_with_proof(EPOCH_INFO_KEY) {
            Some((value, proof)) if value.len() == dirauth_core::epoch::EPOCH_RECORD_LEN => {
                Ok(ProvenValue {
                    value,
                    proof,
                    height: version.version(),
                    root: version.root(),
                })
            }
            _ => Err(StateError::EpochRecordMissing(version.version())),
        }
    }

    /// The document for `epoch` as committed at `height` (0 for the latest)
    pub fn document_for_epoch(&self, epoch: u64, height: u64) -> Result<ProvenValue, StateError> {
        let version = {
            let inner = self.inner.lock();
            if inner.closed {
                return Err(StateError::Closed);
            }
            inner.version_at(height)?
        };
        if let Some((value, proof)) = version.get_with_proof(&document_key(epoch)) {
            return Ok(ProvenValue {
                value,
                proof,
                height: version.version(),
                root: version.root(),
            });
        }
        // Classify against the epoch as of the queried version
        let current = match version.get(EPOCH_INFO_KEY) {
            Some(raw) => {
                EpochRecord::decode(raw)
                    .map_err(|e| StateError::CorruptEpochRecord(e.to_string()))?
                    .epoch
            }
            None => GENESIS_EPOCH,
        };
        if epoch < current {
            Err(StateError::NoDocument(epoch))
        } else if epoch < current.saturating_add(self.config.life_cycle) {
            Err(StateError::DocumentNotReady(epoch))
        } else {
            Err(StateError::DocumentUnknown(epoch))
        }
    }

    /// Still at the genesis epoch with nothing committed
    pub fn is_genesis(&self) -> bool {
        let inner = self.inner.lock();
        inner.current_epoch == GENESIS_EPOCH && inner.block_height == 0
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.lock().current_epoch
    }

    pub fn epoch_start_height(&self) -> u64 {
        self.inner.lock().epoch_start_height
    }

    pub fn block_height(&self) -> u64 {
        self.inner.lock().block_height
    }

    pub fn app_hash(&self) -> Hash {
        self.inner.lock().app_hash
    }

    /// Root of the version committed at `height`, if still retained
    pub fn app_hash_at(&self, height: u64) -> Option<Hash> {
        self.inner.lock().tree.at(height).map(|v| v.root())
    }

    pub fn previous_document(&self) -> Option<Document> {
        self.inner.lock().prev_document.clone()
    }

    /// Whether `epoch` falls in the window open for uploads
    pub fn epoch_in_window(&self, epoch: u64) -> bool {
        let current = self.current_epoch();
        current <= epoch && epoch < current.saturating_add(self.config.life_cycle)
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
