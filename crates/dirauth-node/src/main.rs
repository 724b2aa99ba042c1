use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use dirauth_client::{HttpPkiClient, PkiClient};
use dirauth_core::Codec;
use dirauth_rpc::StatusResponse;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod node;

use cli::{Cli, Commands};
use config::NodeConfig;
use node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run_node(config).await?;
        }
        Commands::Init { output, force } => {
            init_config(output, force)?;
        }
        Commands::Status { endpoint } => {
            show_status(&endpoint).await?;
        }
        Commands::Epoch { endpoint } => {
            show_epoch(&endpoint).await?;
        }
    }

    Ok(())
}

/// Run a directory authority node
async fn run_node(config_path: PathBuf) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);

    if !config_path.exists() {
        error!(
            "Configuration file not found: {:?}. Run 'dirauth init' to create one.",
            config_path
        );
        bail!("Configuration file not found");
    }
    let config = NodeConfig::load(&config_path)?;

    let node = Node::new(config)?;
    node.run().await?;

    Ok(())
}

/// Write the default configuration
fn init_config(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", output.display());
    }

    let config = NodeConfig::default();
    config.save(&output)?;

    info!("Configuration saved to {:?}", output);

    println!("\nConfiguration file created: {}", output.display());
    println!("Edit the file to customize your node settings.");
    println!("\nTo start the node, run:");
    println!("  dirauth run --config {}", output.display());

    Ok(())
}

/// Show node status
async fn show_status(endpoint: &str) -> Result<()> {
    let url = format!("{}/status", endpoint.trim_end_matches('/'));

    let response = reqwest::get(&url).await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;
        println!("Node Status:");
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        error!("Failed to get status: {}", response.status());
    }

    Ok(())
}

/// Show the epoch in preparation
async fn show_epoch(endpoint: &str) -> Result<()> {
    let client = HttpPkiClient::new(endpoint, Codec::canonical());
    let ctx = CancellationToken::new();

    let info = client.get_epoch(&ctx).await?;
    println!("Epoch:          {}", info.epoch);
    println!("Elapsed height: {}", info.elapsed_height);

    client.shutdown().await;
    Ok(())
}
