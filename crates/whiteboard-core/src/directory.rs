//! Directory registry: which boards are shared, and by whom.
//!
//! One `DirectoryRegistry` is created when the index server starts and is
//! handed to every endpoint handler. It keeps three maps, each behind its own
//! lock:
//! - board id → descriptor (at most one entry per id)
//! - endpoint id → live link
//! - endpoint id → owner addresses that endpoint has shared boards under
//!
//! Endpoint ids come from the remote socket address, which for a dialing peer
//! is an ephemeral port. The owner address inside a descriptor is the peer's
//! listening address, so the third map is what lets disconnect cleanup find
//! the boards a lost peer owned.
//!
//! An owner that reconnects re-announces its boards over a new session
//! before the index may have noticed the old one is gone. Re-sharing an
//! identical descriptor from another session therefore moves the owner
//! address to the new session instead of being refused.

use crate::board::BoardDescriptor;
use crate::peers::{ConnectionDirection, PeerRegistry};
use crate::protocol::{codes, names};
use crate::transport::PeerLink;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Soft errors. Each is reported to the originating peer only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Board {0} is already shared")]
    DuplicateShare(String),

    #[error("Board {0} was not shared")]
    UnknownUnshare(String),

    #[error("Malformed descriptor {0:?}")]
    MalformedDescriptor(String),
}

impl DirectoryError {
    /// Code carried by the `ERROR` event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateShare(_) => codes::DUPLICATE_SHARING_REQUEST,
            Self::UnknownUnshare(_) => codes::WHITEBOARD_NOT_EXIST_BUT_UNSHARED,
            Self::MalformedDescriptor(_) => codes::MALFORMED_DESCRIPTOR,
        }
    }
}

pub struct DirectoryRegistry<P> {
    boards: RwLock<HashMap<String, BoardDescriptor>>,
    peers: PeerRegistry<P>,
    owners: RwLock<HashMap<String, HashSet<String>>>,
}

impl<P> Default for DirectoryRegistry<P> {
    fn default() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            peers: PeerRegistry::default(),
            owners: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: PeerLink> DirectoryRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and replay every shared board to it alone.
    pub fn on_peer_connect(&self, link: &Arc<P>) -> usize {
        self.peers
            .insert(Arc::clone(link), ConnectionDirection::Incoming);

        let shared = self.shared_boards();
        for descriptor in &shared {
            send(link, names::SHARING_BOARD, &descriptor.to_string());
        }
        info!("Peer {} connected, replayed {} boards", link.id(), shared.len());
        shared.len()
    }

    /// Handle `SHARE_BOARD`.
    pub fn register_share(&self, origin: &Arc<P>, payload: &str) -> Result<BoardDescriptor, DirectoryError> {
        match self.try_register(origin, payload) {
            Ok(Registration::New(descriptor)) => {
                info!("{} shared {}", origin.id(), descriptor);
                self.fan_out(origin.id(), names::SHARING_BOARD, &descriptor.to_string());
                Ok(descriptor)
            }
            Ok(Registration::TakenOver(descriptor)) => {
                info!("{} re-announced {}, owner moved to this session", origin.id(), descriptor);
                Ok(descriptor)
            }
            Err(e) => {
                self.reject(origin, &e);
                Err(e)
            }
        }
    }

    /// Handle `UNSHARE_BOARD`.
    pub fn unregister_share(&self, origin: &Arc<P>, payload: &str) -> Result<BoardDescriptor, DirectoryError> {
        let result = self.try_unregister(payload);
        match &result {
            Ok(descriptor) => {
                info!("{} unshared {}", origin.id(), descriptor);
                self.fan_out(origin.id(), names::UNSHARING_BOARD, &descriptor.to_string());
            }
            Err(e) => self.reject(origin, e),
        }
        result
    }

    /// Remove a lost peer and every board it owned.
    ///
    /// Returns the removed descriptors; `UNSHARING_BOARD` has been sent for
    /// each to every remaining peer.
    pub fn on_peer_disconnect(&self, id: &str) -> Vec<BoardDescriptor> {
        self.peers.remove(id);

        let removed: Vec<BoardDescriptor> = {
            let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
            let addresses = self
                .owners
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(id)
                .unwrap_or_default();
            let lost: Vec<String> = boards
                .iter()
                .filter(|(_, d)| addresses.contains(&d.owner_address()))
                .map(|(board_id, _)| board_id.clone())
                .collect();
            lost.iter().filter_map(|board_id| boards.remove(board_id)).collect()
        };

        for descriptor in &removed {
            self.fan_out(id, names::UNSHARING_BOARD, &descriptor.to_string());
        }
        info!("Peer {} disconnected, removed {} boards", id, removed.len());
        removed
    }

    /// Currently shared boards, sorted by board id.
    pub fn shared_boards(&self) -> Vec<BoardDescriptor> {
        let mut boards: Vec<_> = self
            .boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        boards.sort_by(|a, b| a.board_id().cmp(b.board_id()));
        boards
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Lock order: `boards` before `owners`.
    fn try_register(&self, origin: &Arc<P>, payload: &str) -> Result<Registration, DirectoryError> {
        let descriptor: BoardDescriptor = payload
            .parse()
            .map_err(|_| DirectoryError::MalformedDescriptor(payload.to_string()))?;
        let address = descriptor.owner_address();

        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let mut owners = self.owners.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = boards.get(descriptor.board_id()) {
            let held_here = owners
                .get(origin.id())
                .is_some_and(|addresses| addresses.contains(&address));
            if *existing != descriptor || held_here {
                return Err(DirectoryError::DuplicateShare(descriptor.board_id().to_string()));
            }
            owners.retain(|_, addresses| {
                addresses.remove(&address);
                !addresses.is_empty()
            });
            owners.entry(origin.id().to_string()).or_default().insert(address);
            return Ok(Registration::TakenOver(descriptor));
        }

        boards.insert(descriptor.board_id().to_string(), descriptor.clone());
        owners.entry(origin.id().to_string()).or_default().insert(address);
        Ok(Registration::New(descriptor))
    }

    fn try_unregister(&self, payload: &str) -> Result<BoardDescriptor, DirectoryError> {
        let descriptor: BoardDescriptor = payload
            .parse()
            .map_err(|_| DirectoryError::MalformedDescriptor(payload.to_string()))?;

        self.boards
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(descriptor.board_id())
            .ok_or_else(|| DirectoryError::UnknownUnshare(descriptor.board_id().to_string()))
    }

    fn reject(&self, origin: &Arc<P>, error: &DirectoryError) {
        warn!("Rejected request from {}: {}", origin.id(), error);
        send(origin, names::ERROR, error.code());
    }

    fn fan_out(&self, except: &str, event_name: &str, payload: &str) {
        let targets = self.peers.all_except(except);
        debug!("Fan-out {} {} to {} peers", event_name, payload, targets.len());
        for link in targets {
            send(&link, event_name, payload);
        }
    }
}

enum Registration {
    New(BoardDescriptor),
    /// Already shared under the same descriptor by another session
    TakenOver(BoardDescriptor),
}

fn send<P: PeerLink>(link: &Arc<P>, event_name: &str, payload: &str) {
    if let Err(e) = link.emit(event_name, payload) {
        warn!("Failed to send {} to {}: {}", event_name, link.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingLink;

    fn connected(registry: &DirectoryRegistry<RecordingLink>, id: &str) -> Arc<RecordingLink> {
        let link = RecordingLink::new(id);
        registry.on_peer_connect(&link);
        link
    }

    #[test]
    fn test_share_fans_out_except_originator() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        let y = connected(&registry, "y");
        let z = connected(&registry, "z");

        registry.register_share(&x, "X:9000:b1").unwrap();

        assert!(x.take().is_empty());
        assert_eq!(y.take(), vec![("SHARING_BOARD".into(), "X:9000:b1".into())]);
        assert_eq!(z.take(), vec![("SHARING_BOARD".into(), "X:9000:b1".into())]);
    }

    #[test]
    fn test_duplicate_share_is_soft_error() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        let y = connected(&registry, "y");

        registry.register_share(&x, "H:9000:b1").unwrap();
        y.take();

        let err = registry.register_share(&x, "H:9000:b1").unwrap_err();
        assert_eq!(err, DirectoryError::DuplicateShare("b1".into()));
        assert_eq!(x.take(), vec![("ERROR".into(), "DUPLICATE_SHARING_REQUEST".into())]);
        // Nobody else hears about it
        assert!(y.take().is_empty());
        assert_eq!(registry.shared_boards().len(), 1);
    }

    #[test]
    fn test_same_board_id_from_other_owner_is_duplicate() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        let y = connected(&registry, "y");

        registry.register_share(&x, "X:9000:b1").unwrap();
        assert!(registry.register_share(&y, "Y:9000:b1").is_err());
        assert_eq!(registry.shared_boards(), vec!["X:9000:b1".parse().unwrap()]);
    }

    #[test]
    fn test_reannounce_from_new_session_takes_over() {
        let registry = DirectoryRegistry::new();
        let old = connected(&registry, "10.0.0.1:50000");
        let watcher = connected(&registry, "w");
        registry.register_share(&old, "X:9000:b1").unwrap();
        registry.register_share(&old, "X:9000:b2").unwrap();
        watcher.take();

        // Owner reconnected before the old session timed out.
        let new = connected(&registry, "10.0.0.1:50001");
        new.take();
        assert!(registry.register_share(&new, "X:9000:b1").is_ok());
        assert!(new.take().is_empty());
        assert!(watcher.take().is_empty());

        assert!(registry.on_peer_disconnect("10.0.0.1:50000").is_empty());
        assert_eq!(registry.shared_boards().len(), 2);
        assert!(watcher.take().is_empty());

        let removed = registry.on_peer_disconnect("10.0.0.1:50001");
        assert_eq!(removed.len(), 2);
        assert!(registry.shared_boards().is_empty());
    }

    #[test]
    fn test_unshare() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        let y = connected(&registry, "y");

        registry.register_share(&x, "X:9000:b1").unwrap();
        y.take();
        registry.unregister_share(&x, "X:9000:b1").unwrap();

        assert_eq!(y.take(), vec![("UNSHARING_BOARD".into(), "X:9000:b1".into())]);
        assert!(x.take().is_empty());
        assert!(registry.shared_boards().is_empty());
    }

    #[test]
    fn test_unshare_unknown_is_soft_error() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");

        let err = registry.unregister_share(&x, "X:9000:b9").unwrap_err();
        assert_eq!(err.code(), "WHITEBOARD_NOT_EXIST_BUT_UNSHARED");
        assert_eq!(x.take(), vec![("ERROR".into(), "WHITEBOARD_NOT_EXIST_BUT_UNSHARED".into())]);
        assert!(registry.shared_boards().is_empty());
    }

    #[test]
    fn test_malformed_descriptor() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");

        let err = registry.register_share(&x, "not-a-descriptor").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_DESCRIPTOR");
        assert!(registry.shared_boards().is_empty());
    }

    #[test]
    fn test_connect_replays_to_new_peer_only() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        registry.register_share(&x, "X:9000:b1").unwrap();
        registry.register_share(&x, "X:9000:b2").unwrap();

        let y = connected(&registry, "y");
        assert_eq!(
            y.take(),
            vec![
                ("SHARING_BOARD".into(), "X:9000:b1".into()),
                ("SHARING_BOARD".into(), "X:9000:b2".into()),
            ]
        );
        assert!(x.take().is_empty());
    }

    #[test]
    fn test_disconnect_removes_only_owned_boards() {
        let registry = DirectoryRegistry::new();
        let x = connected(&registry, "x");
        let y = connected(&registry, "y");
        let z = connected(&registry, "z");

        registry.register_share(&x, "X:9000:b1").unwrap();
        registry.register_share(&y, "Y:9000:b2").unwrap();
        z.take();

        let removed = registry.on_peer_disconnect("x");

        assert_eq!(removed, vec!["X:9000:b1".parse().unwrap()]);
        assert_eq!(registry.shared_boards(), vec!["Y:9000:b2".parse().unwrap()]);
        assert_eq!(registry.peer_count(), 2);
        assert_eq!(y.sent_named("UNSHARING_BOARD"), vec!["X:9000:b1"]);
        assert_eq!(z.take(), vec![("UNSHARING_BOARD".into(), "X:9000:b1".into())]);
    }

    #[test]
    fn test_disconnect_of_unknown_peer() {
        let registry: DirectoryRegistry<RecordingLink> = DirectoryRegistry::new();
        assert!(registry.on_peer_disconnect("ghost").is_empty());
    }
}
