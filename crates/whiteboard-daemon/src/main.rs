//! whiteboard-daemon: index server and whiteboard peer.
//!
//! `whiteboard-daemon index` runs the directory of shared boards.
//! `whiteboard-daemon peer` runs a peer with a line console on stdin.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use whiteboard_daemon::config::{Cli, Command, IndexConfig, PeerConfig};
use whiteboard_daemon::{console, IndexServer, WhiteboardPeer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose).
    // Logs go to stderr so they do not interleave with console output.
    let default_filter = if cli.verbose {
        "debug,whiteboard_daemon=debug,whiteboard_core=debug"
    } else {
        "info,whiteboard_daemon=info,whiteboard_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Index(args) => run_index(IndexConfig::from(args)).await,
        Command::Peer(args) => run_peer(PeerConfig::from(args)).await,
    }
}

async fn run_index(config: IndexConfig) -> Result<()> {
    info!("Starting index server on {}", config.listen);
    let server = IndexServer::start(&config).await?;
    info!("Index running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.shutdown().await;
    Ok(())
}

async fn run_peer(config: PeerConfig) -> Result<()> {
    info!(
        "Starting peer {}:{} (index {}:{})",
        config.host, config.port, config.index_host, config.index_port
    );
    let peer = WhiteboardPeer::start(config).await?;

    let outcome = tokio::select! {
        result = console::run(peer.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    peer.shutdown().await;
    outcome
}
