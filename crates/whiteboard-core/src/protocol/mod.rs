//! Wire protocol for peer communication.
//!
//! One connection multiplexes three logical protocols:
//! - Session handshake (optional shared secret)
//! - KeepAlive heartbeats
//! - Event envelope carrying application events

pub mod event;
pub mod keepalive;
pub mod lifecycle;
pub mod message;
pub mod session;

pub use event::{codes, names};
pub use keepalive::{KeepAliveConfig, KeepAliveDecision, KeepAliveTracker};
pub use lifecycle::{LifecycleError, ProtocolKind, ProtocolState, ProtocolTable};
pub use message::{Message, MessageError, MessageType, MAX_MESSAGE_SIZE};
pub use session::{HandshakeError, Session, SessionState, HANDSHAKE_TIMEOUT};
