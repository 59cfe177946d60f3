//! Listen/unlisten subscriptions and snapshot fan-out.

use crate::board::BoardDescriptor;
use crate::transport::PeerLink;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Board → subscribed endpoints (keyed by endpoint id).
pub struct SubscriptionSet<P> {
    boards: RwLock<HashMap<BoardDescriptor, HashMap<String, Arc<P>>>>,
}

impl<P> Default for SubscriptionSet<P> {
    fn default() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: PeerLink> SubscriptionSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `link`. Returns false if it was already subscribed.
    pub fn listen(&self, descriptor: &BoardDescriptor, link: &Arc<P>) -> bool {
        self.boards
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(descriptor.clone())
            .or_default()
            .insert(link.id().to_string(), Arc::clone(link))
            .is_none()
    }

    /// Unsubscribe one endpoint. Returns false if it was not subscribed.
    pub fn unlisten(&self, descriptor: &BoardDescriptor, id: &str) -> bool {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let Some(subscribers) = boards.get_mut(descriptor) else {
            return false;
        };
        let removed = subscribers.remove(id).is_some();
        if subscribers.is_empty() {
            boards.remove(descriptor);
        }
        removed
    }

    pub fn subscribers(&self, descriptor: &BoardDescriptor) -> Vec<Arc<P>> {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(descriptor)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a board's whole subscription set, returning who was subscribed.
    pub fn remove_board(&self, descriptor: &BoardDescriptor) -> Vec<Arc<P>> {
        self.boards
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(descriptor)
            .map(|subs| subs.into_values().collect())
            .unwrap_or_default()
    }

    /// Forget an endpoint everywhere. Returns how many subscriptions it held.
    pub fn drop_endpoint(&self, id: &str) -> usize {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let mut dropped = 0;
        boards.retain(|_, subscribers| {
            if subscribers.remove(id).is_some() {
                dropped += 1;
            }
            !subscribers.is_empty()
        });
        dropped
    }

    /// Boards with at least one subscriber.
    pub fn boards(&self) -> Vec<BoardDescriptor> {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Emit to every subscriber of `descriptor`. Returns how many sends were queued.
    pub fn broadcast(&self, descriptor: &BoardDescriptor, event_name: &str, payload: &str) -> usize {
        let mut sent = 0;
        for link in self.subscribers(descriptor) {
            match link.emit(event_name, payload) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to send {} to {}: {}", event_name, link.id(), e),
            }
        }
        sent
    }
}
