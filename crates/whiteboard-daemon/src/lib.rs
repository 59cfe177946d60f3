//! whiteboard-daemon library: the networked side of the whiteboard.
//!
//! Exposes the index server, the peer, and their session plumbing so
//! integration tests can drive them in-process.

pub mod config;
pub mod console;
pub mod endpoint;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod peer;
pub mod reconnect;
pub mod server;

pub use config::{Cli, Command, IndexConfig, PeerConfig, Timing};
pub use endpoint::{DispatchTable, Endpoint, EndpointConfig, EndpointError, EndpointExit};
pub use manager::{ConnectionManager, ManagerConfig, SessionHooks};
pub use peer::WhiteboardPeer;
pub use server::IndexServer;
