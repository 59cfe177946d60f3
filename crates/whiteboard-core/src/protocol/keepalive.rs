//! Heartbeat liveness detection.
//!
//! Once a session is active each side periodically sends a
//! `KeepAliveRequest` and expects a `KeepAliveReply` within a fixed window.
//! A missing reply past the deadline means the remote is gone; the endpoint
//! treats that exactly like an abrupt disconnect.
//!
//! The tracker is clock-agnostic: the caller passes milliseconds from any
//! monotonic source and acts on the returned [`KeepAliveDecision`].

use super::message::{Message, MessageType};
use std::time::Duration;

pub const PROTOCOL_NAME: &str = "KeepAliveProtocol";
pub const REQUEST: &str = "KeepAliveRequest";
pub const REPLY: &str = "KeepAliveReply";

pub fn request() -> Message {
    Message::new(REQUEST, PROTOCOL_NAME, MessageType::Request)
}

pub fn reply() -> Message {
    Message::new(REPLY, PROTOCOL_NAME, MessageType::Reply)
}

/// Configuration for heartbeats.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// How often to send a heartbeat (default: 20s)
    pub interval: Duration,
    /// How long to wait for the reply (default: 20s)
    pub timeout: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(20),
        }
    }
}

/// What the caller should do after polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveDecision {
    /// Send a `KeepAliveRequest` now
    SendHeartbeat,
    /// No reply within the window; the endpoint is gone
    TimedOut,
}

/// Tracks the outstanding heartbeat for one endpoint.
#[derive(Debug)]
pub struct KeepAliveTracker {
    interval_ms: u64,
    timeout_ms: u64,
    /// When the last heartbeat was sent (or the tracker started)
    last_sent: u64,
    /// Set while a heartbeat is waiting for its reply
    awaiting_since: Option<u64>,
}

impl KeepAliveTracker {
    pub fn new(config: &KeepAliveConfig, now_ms: u64) -> Self {
        Self {
            interval_ms: config.interval.as_millis() as u64,
            timeout_ms: config.timeout.as_millis() as u64,
            last_sent: now_ms,
            awaiting_since: None,
        }
    }

    /// Decide whether a heartbeat is due or the remote has timed out.
    ///
    /// Returning `SendHeartbeat` records the heartbeat as sent.
    pub fn poll(&mut self, now_ms: u64) -> Option<KeepAliveDecision> {
        if let Some(sent_at) = self.awaiting_since {
            if now_ms.saturating_sub(sent_at) >= self.timeout_ms {
                return Some(KeepAliveDecision::TimedOut);
            }
            return None;
        }

        if now_ms.saturating_sub(self.last_sent) >= self.interval_ms {
            self.last_sent = now_ms;
            self.awaiting_since = Some(now_ms);
            return Some(KeepAliveDecision::SendHeartbeat);
        }

        None
    }

    /// Record a `KeepAliveReply`.
    pub fn note_reply(&mut self) {
        self.awaiting_since = None;
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KeepAliveConfig {
        KeepAliveConfig {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_nothing_due_before_interval() {
        let mut tracker = KeepAliveTracker::new(&config(), 0);
        assert_eq!(tracker.poll(999), None);
    }

    #[test]
    fn test_heartbeat_due_after_interval() {
        let mut tracker = KeepAliveTracker::new(&config(), 0);
        assert_eq!(tracker.poll(1000), Some(KeepAliveDecision::SendHeartbeat));
        assert!(tracker.is_awaiting_reply());

        // Only one outstanding heartbeat at a time
        assert_eq!(tracker.poll(1200), None);
    }

    #[test]
    fn test_reply_clears_deadline() {
        let mut tracker = KeepAliveTracker::new(&config(), 0);
        tracker.poll(1000);
        tracker.note_reply();

        assert!(!tracker.is_awaiting_reply());
        assert_eq!(tracker.poll(1600), None);
        assert_eq!(tracker.poll(2000), Some(KeepAliveDecision::SendHeartbeat));
    }

    #[test]
    fn test_timeout_without_reply() {
        let mut tracker = KeepAliveTracker::new(&config(), 0);
        tracker.poll(1000);

        assert_eq!(tracker.poll(1499), None);
        assert_eq!(tracker.poll(1500), Some(KeepAliveDecision::TimedOut));
        // Stays timed out
        assert_eq!(tracker.poll(5000), Some(KeepAliveDecision::TimedOut));
    }

    #[test]
    fn test_default_config() {
        let config = KeepAliveConfig::default();
        assert_eq!(config.interval, Duration::from_secs(20));
        assert_eq!(config.timeout, Duration::from_secs(20));
    }
}
