use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use dirauth_core::{Parameters, MAX_LAYERS};
use dirauth_mempool::MempoolConfig;
use dirauth_rpc::DEFAULT_RPC_PORT;
use dirauth_state::state::{
    DEFAULT_EPOCH_INTERVAL, DEFAULT_LAYERS, DEFAULT_LIFE_CYCLE, DEFAULT_MIN_NODES_PER_LAYER,
    DEFAULT_RETAIN_VERSIONS,
};
use dirauth_state::LedgerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DATA_DIR: &str = "./dirauth-data";
pub const STATE_FILE: &str = "state.bin";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{layers} layers requested, at most {max} supported")]
    TooManyLayers { layers: usize, max: usize },

    #[error("mempool limit per sender {per_sender} exceeds pool size {max_size}")]
    SenderLimitTooLarge { per_sender: usize, max_size: usize },
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node data directory
    pub data_dir: PathBuf,

    /// RPC bind address
    pub rpc_addr: SocketAddr,

    /// Mix layers in every document
    pub layers: usize,

    pub min_nodes_per_layer: usize,

    /// Blocks per epoch
    pub epoch_interval: u64,

    /// Epochs open for descriptor uploads
    pub life_cycle: u64,

    /// Committed versions kept for historic proofs
    pub retain_versions: usize,

    /// Mempool max size
    pub mempool_max_size: usize,

    /// Mempool max per sender
    pub mempool_max_per_sender: usize,

    /// Published with every document
    pub parameters: Parameters,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mempool = MempoolConfig::default();
        NodeConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RPC_PORT)),
            layers: DEFAULT_LAYERS,
            min_nodes_per_layer: DEFAULT_MIN_NODES_PER_LAYER,
            epoch_interval: DEFAULT_EPOCH_INTERVAL,
            life_cycle: DEFAULT_LIFE_CYCLE,
            retain_versions: DEFAULT_RETAIN_VERSIONS,
            mempool_max_size: mempool.max_size,
            mempool_max_per_sender: mempool.max_per_sender,
            parameters: Parameters::default(),
        }
    }
}

impl NodeConfig {
    /// Load config from file, filling in anything left unset
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: NodeConfig = serde_json::from_str(&content)?;
        config.fixup_and_validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace zero values with defaults and reject inconsistent settings
    pub fn fixup_and_validate(&mut self) -> Result<(), ConfigError> {
        let defaults = NodeConfig::default();
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = defaults.data_dir;
        }
        if self.layers == 0 {
            self.layers = defaults.layers;
        }
        if self.min_nodes_per_layer == 0 {
            self.min_nodes_per_layer = defaults.min_nodes_per_layer;
        }
        if self.epoch_interval == 0 {
            self.epoch_interval = defaults.epoch_interval;
        }
        if self.life_cycle == 0 {
            self.life_cycle = defaults.life_cycle;
        }
        if self.retain_versions == 0 {
            self.retain_versions = defaults.retain_versions;
        }
        if self.mempool_max_size == 0 {
            self.mempool_max_size = defaults.mempool_max_size;
        }
        if self.mempool_max_per_sender == 0 {
            self.mempool_max_per_sender = defaults.mempool_max_per_sender;
        }
        self.parameters.fixup();

        if self.layers > MAX_LAYERS {
            return Err(ConfigError::TooManyLayers {
                layers: self.layers,
                max: MAX_LAYERS,
            });
        }
        if self.mempool_max_per_sender > self.mempool_max_size {
            return Err(ConfigError::SenderLimitTooLarge {
                per_sender: self.mempool_max_per_sender,
                max_size: self.mempool_max_size,
            });
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            layers: self.layers,
            min_nodes_per_layer: self.min_nodes_per_layer,
            epoch_interval: self.epoch_interval,
            life_cycle: self.life_cycle,
            parameters: self.parameters.clone(),
            retain_versions: self.retain_versions,
        }
    }

    pub fn mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            max_size: self.mempool_max_size,
            max_per_sender: self.mempool_max_per_sender,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }
}
