//! Ember node binary.
//!
//! Wires the in-memory chain, the peer registry, and the sync engine
//! together and runs until interrupted. Networking transports register
//! their peers with the exposed [`ember_network::SyncPeers`] registry.

use anyhow::Result;
use clap::Parser;
use ember_chain::{BasicHeaderValidator, MemoryChain};
use ember_core::{Block, BlockHeader, H256, U256};
use ember_network::SyncPeers;
use ember_sync::{NullEvents, SyncManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::NodeConfig;

/// Ember blockchain node.
#[derive(Parser, Debug)]
#[command(name = "ember-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "ember-node.toml")]
    config: PathBuf,

    /// Disable block synchronization
    #[arg(long)]
    no_sync: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Shutdown drain deadline.
const STOP_DEADLINE: Duration = Duration::from_secs(10);

fn genesis_block(network: &str) -> Block {
    Block::new(
        BlockHeader::new(
            H256::zero(),
            0,
            U256::from(0x20000),
            0,
            network.as_bytes().to_vec(),
        ),
        vec![],
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Ember node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NodeConfig::load(&args.config)?;
    if args.no_sync {
        config.sync.sync_enabled = false;
    }
    info!(node = %config.node_name, network = %config.network, "Configuration loaded");

    let chain = Arc::new(MemoryChain::new(genesis_block(&config.network)));
    let peers = Arc::new(SyncPeers::default());

    // The chain is initialized above, so the engine can anchor immediately.
    let manager = SyncManager::new(
        config.sync.clone(),
        chain.clone(),
        peers.clone(),
        Arc::new(BasicHeaderValidator),
        Arc::new(NullEvents),
    );
    let handle = manager.start();

    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");
    handle.stop(STOP_DEADLINE).await;

    info!(head = chain.head_number(), "Ember node stopped");
    Ok(())
}
