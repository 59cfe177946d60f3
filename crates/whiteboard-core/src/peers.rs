//! Peer registry for tracking connected endpoints.
//!
//! Shared by the connection manager and the application layer. An entry
//! lives exactly as long as its session: inserted once the handshake
//! completes, removed when the endpoint closes or is lost.

use crate::transport::PeerLink;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Reason a session ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    /// Local `close()`, or a remote stop request we answered
    Closed,
    /// Socket ended without a stop request
    RemoteClosed,
    /// I/O error on the socket
    NetworkError,
    /// Heartbeat reply missed its deadline
    TimedOut,
    /// Undecodable or out-of-order message
    ProtocolError,
}

impl DisconnectReason {
    /// Graceful endings are reported as "stopped", everything else as "error".
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Connection direction from our perspective.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionDirection {
    Incoming,
    Outgoing,
}

/// Tracked state for a connected endpoint.
pub struct ConnectedPeer<P> {
    pub link: Arc<P>,
    pub direction: ConnectionDirection,
}

impl<P> Clone for ConnectedPeer<P> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            direction: self.direction,
        }
    }
}

/// Registry of live sessions keyed by endpoint id.
///
/// Thread-safe for use in multi-threaded Tokio runtime.
/// Wrap in `Arc` for shared ownership.
pub struct PeerRegistry<P> {
    peers: RwLock<HashMap<String, ConnectedPeer<P>>>,
}

impl<P> Default for PeerRegistry<P> {
    fn default() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: PeerLink> PeerRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session. Returns false if the id was already present; the
    /// newer link replaces the old one.
    pub fn insert(&self, link: Arc<P>, direction: ConnectionDirection) -> bool {
        let id = link.id().to_string();
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, ConnectedPeer { link, direction })
            .is_none()
    }

    pub fn remove(&self, id: &str) -> Option<ConnectedPeer<P>> {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<P>> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|peer| Arc::clone(&peer.link))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Every live link except `id` (fan-out that skips the originator).
    pub fn all_except(&self, id: &str) -> Vec<Arc<P>> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(peer_id, _)| peer_id.as_str() != id)
            .map(|(_, peer)| Arc::clone(&peer.link))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
