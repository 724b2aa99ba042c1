use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dirauth - Mixnet directory authority
#[derive(Parser)]
#[command(name = "dirauth")]
#[command(about = "Directory authority node and utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a directory authority node
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Write a configuration file with default settings
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show node status
    Status {
        /// RPC endpoint
        #[arg(short, long, default_value = "http://127.0.0.1:26657")]
        endpoint: String,
    },

    /// Show the epoch in preparation, verified against the node's app hash
    Epoch {
        /// RPC endpoint
        #[arg(short, long, default_value = "http://127.0.0.1:26657")]
        endpoint: String,
    },
}
