//! Request and response messages exchanged with the consensus engine.

use dirauth_core::{Address, Hash, MerkleProof, ValidatorUpdate};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

pub const CODE_OK: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// Hex of the current epoch as an 8-byte uvarint field
    pub data: String,
    pub version: String,
    pub app_version: u64,
    pub last_block_height: u64,
    pub last_block_app_hash: Hash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInitChain {
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInitChain {
    pub app_hash: Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    DuplicateVote,
    LightClientAttack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misbehavior {
    pub kind: EvidenceKind,
    pub address: Address,
    pub power: i64,
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub height: u64,
    #[serde(default)]
    pub byzantine_validators: Vec<Misbehavior>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTx {
    #[serde_as(as = "Hex")]
    pub tx: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCheckTx {
    pub code: u32,
    pub log: String,
    pub gas_wanted: i64,
}

impl ResponseCheckTx {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub log: String,
}

impl ResponseDeliverTx {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCommit {
    pub data: Hash,
    pub height: u64,
    pub epoch: u64,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    /// Encoded `Query`
    #[serde_as(as = "Hex")]
    pub data: Vec<u8>,
    /// 0 for the latest committed height
    #[serde(default)]
    pub height: u64,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
    #[serde_as(as = "Hex")]
    pub key: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub value: Vec<u8>,
    pub proof: Option<MerkleProof>,
    pub height: u64,
    /// Root of the version at `height`
    pub app_hash: Option<Hash>,
}

impl ResponseQuery {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}
