//! whiteboard-core: shared library for replicated whiteboards.
//!
//! This crate provides the runtime-agnostic pieces:
//! - Wire message codec and the session/keep-alive/event protocols
//! - Board descriptors, snapshots, and the per-board version gate
//! - Directory registry used by the index server
//! - Board replica used by every peer
//! - The `PeerLink` seam that the daemon's endpoints implement

pub mod board;
pub mod directory;
pub mod events;
pub mod peers;
pub mod protocol;
pub mod replica;
pub mod subscriptions;
pub mod transport;

pub use board::{BoardDescriptor, Snapshot, UpdateKind, Whiteboard, WhiteboardPath};
pub use directory::{DirectoryError, DirectoryRegistry};
pub use events::{BoardEvent, EventBus, Subscription};
pub use peers::{ConnectionDirection, DisconnectReason, PeerRegistry};
pub use replica::{BoardReplica, BoardSummary, Mutation, MutationOutcome, ReplicaError};
pub use transport::{PeerLink, TransportError};
