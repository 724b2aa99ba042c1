use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::encoding::Codec;
use crate::error::CoreError;

pub const PROTOCOL_VERSION: &str = "1.0";

/// Command tags shared by transactions and queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Command {
    PublishMixDescriptor = 1,
    /// Documents are generated by the ledger itself; kept so the tag stays reserved.
    AddConsensusDocument = 2,
    AddNewAuthority = 3,
    GetConsensus = 4,
    GetEpoch = 5,
}

impl TryFrom<u64> for Command {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Command::PublishMixDescriptor),
            2 => Ok(Command::AddConsensusDocument),
            3 => Ok(Command::AddNewAuthority),
            4 => Ok(Command::GetConsensus),
            5 => Ok(Command::GetEpoch),
            other => Err(CoreError::UnknownCommand(other)),
        }
    }
}

impl From<Command> for u64 {
    fn from(command: Command) -> Self {
        command as u64
    }
}

/// Read request carried in a consensus query
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Query {
    pub version: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub epoch: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub command: u64,
    #[serde(default)]
    pub payload: String,
}

impl Query {
    pub fn new(command: Command, epoch: u64) -> Self {
        Query {
            version: PROTOCOL_VERSION.to_string(),
            epoch,
            command: command.into(),
            payload: String::new(),
        }
    }

    pub fn command(&self) -> Result<Command, CoreError> {
        Command::try_from(self.command)
    }

    pub fn encode(&self, codec: &Codec) -> Result<Vec<u8>, CoreError> {
        codec.encode(self)
    }

    pub fn decode(codec: &Codec, raw: &[u8]) -> Result<Self, CoreError> {
        codec.decode(raw)
    }
}
