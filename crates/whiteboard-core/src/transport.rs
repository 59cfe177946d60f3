//! `PeerLink` trait: the one thing application logic needs from a connection.
//!
//! Implementations:
//! - Daemon: WebSocket endpoint wrapping each event in an `EventRequest`
//! - Tests: in-memory recorder

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// An active session with a remote peer or the index server.
///
/// `emit` is fire-and-forget: it queues one event for the connection's
/// writer and never waits on the network, so handlers may call it freely.
pub trait PeerLink: Send + Sync {
    /// Stable identity, derived from the remote address
    fn id(&self) -> &str;

    /// Queue an application event
    fn emit(&self, event_name: &str, payload: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records every emitted event.
    pub struct RecordingLink {
        id: String,
        sent: Mutex<Vec<(String, String)>>,
        closed: AtomicBool,
    }

    impl RecordingLink {
        pub fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            })
        }

        /// Drain what was sent so far.
        pub fn take(&self) -> Vec<(String, String)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        /// Payloads sent under one event name, without draining.
        pub fn sent_named(&self, event_name: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == event_name)
                .map(|(_, payload)| payload.clone())
                .collect()
        }

        pub fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl PeerLink for RecordingLink {
        fn id(&self) -> &str {
            &self.id
        }

        fn emit(&self, event_name: &str, payload: &str) -> Result<()> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed(self.id.clone()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((event_name.to_string(), payload.to_string()));
            Ok(())
        }
    }
}
