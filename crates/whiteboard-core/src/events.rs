//! Board change notifications.
//!
//! Provides `BoardEvent` for the rendering surface and `EventBus` for
//! subscriptions. Subscribers redraw on every event; nothing here is on the
//! replication path.

use crate::board::BoardDescriptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Something about a board changed and the surface should redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// A mutation was accepted or a snapshot was adopted.
    Changed {
        descriptor: BoardDescriptor,
        version: u64,
    },
    /// The board is gone from this peer.
    Removed { descriptor: BoardDescriptor },
    /// A local mutation lost the version race; `version` is the current one.
    Rejected {
        descriptor: BoardDescriptor,
        version: u64,
    },
}

impl BoardEvent {
    pub fn descriptor(&self) -> &BoardDescriptor {
        match self {
            Self::Changed { descriptor, .. }
            | Self::Removed { descriptor }
            | Self::Rejected { descriptor, .. } => descriptor,
        }
    }
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(BoardEvent) + Send + Sync>;

/// Event bus for publishing board events to subscribers.
///
/// Thread-safe for use in multi-threaded Tokio runtime.
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(BoardEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: BoardEvent) {
        // Clone the list so a callback may subscribe without deadlocking
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
