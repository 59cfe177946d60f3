//! Command line and runtime configuration.

use crate::endpoint::EndpointConfig;
use crate::heartbeat;
use crate::manager::ManagerConfig;
use crate::reconnect::ReconnectConfig;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

pub const DEFAULT_INDEX_PORT: u16 = 3100;
pub const DEFAULT_PEER_PORT: u16 = 3200;

#[derive(Parser, Debug)]
#[command(name = "whiteboard-daemon")]
#[command(about = "Shared whiteboard index server and peer")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the index server that tracks shared boards
    Index(IndexArgs),
    /// Run a whiteboard peer with an interactive console
    Peer(PeerArgs),
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_INDEX_PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Shared secret peers must present
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct PeerArgs {
    /// Port this peer listens on for subscribers
    #[arg(short, long, default_value_t = DEFAULT_PEER_PORT)]
    pub port: u16,

    /// Host other peers use to reach this one
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Index server host
    #[arg(long, default_value = "127.0.0.1")]
    pub index_host: String,

    /// Index server port
    #[arg(long, default_value_t = DEFAULT_INDEX_PORT)]
    pub index_port: u16,

    /// Shared secret for the index and other peers
    #[arg(long)]
    pub password: Option<String>,
}

/// Every timer in one place, so tests can shrink them.
#[derive(Debug, Clone)]
pub struct Timing {
    pub endpoint: EndpointConfig,
    /// Snapshot re-broadcast period for boards with subscribers
    pub snapshot_heartbeat: Duration,
    /// Backoff for re-dialing the index
    pub reconnect: ReconnectConfig,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            snapshot_heartbeat: heartbeat::DEFAULT_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// `host:port` to bind
    pub listen: String,
    pub secret: Option<String>,
    pub timing: Timing,
}

impl IndexConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            secret: self.secret.clone(),
            endpoint: self.timing.endpoint.clone(),
        }
    }
}

impl From<&IndexArgs> for IndexConfig {
    fn from(args: &IndexArgs) -> Self {
        Self {
            listen: format!("{}:{}", args.bind, args.port),
            secret: args.password.clone(),
            timing: Timing::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Interface to bind
    pub bind: String,
    /// Listening port; 0 picks a free one
    pub port: u16,
    /// Host written into descriptors of boards owned here
    pub host: String,
    pub index_host: String,
    pub index_port: u16,
    pub secret: Option<String>,
    pub timing: Timing,
}

impl PeerConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            secret: self.secret.clone(),
            endpoint: self.timing.endpoint.clone(),
        }
    }
}

impl From<&PeerArgs> for PeerConfig {
    fn from(args: &PeerArgs) -> Self {
        Self {
            bind: args.bind.clone(),
            port: args.port,
            host: args.host.clone(),
            index_host: args.index_host.clone(),
            index_port: args.index_port,
            secret: args.password.clone(),
            timing: Timing::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_defaults() {
        let cli = Cli::parse_from(["whiteboard-daemon", "index"]);
        let Command::Index(args) = cli.command else {
            panic!("expected index");
        };
        let config = IndexConfig::from(&args);
        assert_eq!(config.listen, "0.0.0.0:3100");
        assert!(config.secret.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_peer_args() {
        let cli = Cli::parse_from([
            "whiteboard-daemon",
            "peer",
            "--port",
            "4000",
            "--host",
            "10.0.0.5",
            "--index-host",
            "10.0.0.1",
            "--password",
            "s3cret",
            "--verbose",
        ]);
        assert!(cli.verbose);
        let Command::Peer(args) = cli.command else {
            panic!("expected peer");
        };
        let config = PeerConfig::from(&args);
        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.index_host, "10.0.0.1");
        assert_eq!(config.index_port, DEFAULT_INDEX_PORT);
        assert_eq!(config.manager_config().secret.as_deref(), Some("s3cret"));
    }
}
