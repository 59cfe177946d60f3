//! Protocol lifecycle shared by every protocol on an endpoint.
//!
//! ```text
//! Requested ──accept──▶ Active ──stop──▶ Stopped
//!     │
//!     └──────reject──▶ Rejected
//! ```
//!
//! The manager decides whether a requested protocol may start. The only
//! rule today: the session protocol comes first, and nothing else runs
//! until the session is active.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Protocol {0:?} was never requested")]
    NotRequested(ProtocolKind),

    #[error("Protocol {kind:?} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        kind: ProtocolKind,
        from: ProtocolState,
        to: ProtocolState,
    },
}

/// The protocols multiplexed over one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Session,
    KeepAlive,
    Event,
}

impl ProtocolKind {
    /// Resolve a wire protocol tag.
    pub fn from_wire(protocol: &str) -> Option<Self> {
        match protocol {
            super::session::PROTOCOL_NAME => Some(Self::Session),
            super::keepalive::PROTOCOL_NAME => Some(Self::KeepAlive),
            super::event::PROTOCOL_NAME => Some(Self::Event),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Session => super::session::PROTOCOL_NAME,
            Self::KeepAlive => super::keepalive::PROTOCOL_NAME,
            Self::Event => super::event::PROTOCOL_NAME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Requested,
    Active,
    Stopped,
    Rejected,
}

impl ProtocolState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Rejected)
    }
}

/// Protocol states for one endpoint.
#[derive(Debug, Default)]
pub struct ProtocolTable {
    states: HashMap<ProtocolKind, ProtocolState>,
}

impl ProtocolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: ProtocolKind) -> Option<ProtocolState> {
        self.states.get(&kind).copied()
    }

    pub fn is_active(&self, kind: ProtocolKind) -> bool {
        self.state(kind) == Some(ProtocolState::Active)
    }

    /// Whether the manager would admit `kind` right now.
    pub fn admits(&self, kind: ProtocolKind) -> bool {
        match kind {
            ProtocolKind::Session => self.state(kind).is_none(),
            ProtocolKind::KeepAlive | ProtocolKind::Event => {
                self.is_active(ProtocolKind::Session)
            }
        }
    }

    /// Request `kind`, then accept or reject it according to [`Self::admits`].
    ///
    /// Already-active protocols stay active. Returns the resulting state.
    pub fn request(&mut self, kind: ProtocolKind) -> ProtocolState {
        if self.is_active(kind) {
            return ProtocolState::Active;
        }
        let admitted = self.admits(kind);
        self.states.insert(kind, ProtocolState::Requested);
        let outcome = if admitted {
            self.accept(kind)
        } else {
            self.reject(kind)
        };
        match outcome {
            Ok(state) => state,
            Err(_) => ProtocolState::Rejected,
        }
    }

    /// Move a requested protocol to Active.
    pub fn accept(&mut self, kind: ProtocolKind) -> Result<ProtocolState, LifecycleError> {
        self.transition(kind, ProtocolState::Active)
    }

    /// Move a requested protocol to Rejected.
    pub fn reject(&mut self, kind: ProtocolKind) -> Result<ProtocolState, LifecycleError> {
        self.transition(kind, ProtocolState::Rejected)
    }

    /// Stop an active protocol.
    pub fn stop(&mut self, kind: ProtocolKind) -> Result<ProtocolState, LifecycleError> {
        self.transition(kind, ProtocolState::Stopped)
    }

    /// Stop every active protocol (endpoint teardown).
    pub fn stop_all(&mut self) {
        for state in self.states.values_mut() {
            if matches!(state, ProtocolState::Active | ProtocolState::Requested) {
                *state = ProtocolState::Stopped;
            }
        }
    }

    fn transition(
        &mut self,
        kind: ProtocolKind,
        to: ProtocolState,
    ) -> Result<ProtocolState, LifecycleError> {
        let from = self
            .state(kind)
            .ok_or(LifecycleError::NotRequested(kind))?;
        let allowed = matches!(
            (from, to),
            (ProtocolState::Requested, ProtocolState::Active)
                | (ProtocolState::Requested, ProtocolState::Rejected)
                | (ProtocolState::Active, ProtocolState::Stopped)
        );
        if !allowed {
            return Err(LifecycleError::InvalidTransition { kind, from, to });
        }
        self.states.insert(kind, to);
        Ok(to)
    }
}
