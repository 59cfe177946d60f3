//! Session handshake.
//!
//! The dialing side sends `SessionStartRequest` (carrying the shared secret
//! when one is configured); the accepting side checks the secret and answers
//! with `SessionStartReply`. A reply carrying an `error` field means the
//! handshake was refused. Until both sides reach [`SessionState::Active`] the
//! connection is not usable by the application.
//!
//! Stopping is symmetric: `SessionStopRequest` is answered with
//! `SessionStopReply` and both sides close.

use super::message::{Message, MessageType};
use std::time::Duration;
use thiserror::Error;

pub const PROTOCOL_NAME: &str = "SessionProtocol";
pub const START_REQUEST: &str = "SessionStartRequest";
pub const START_REPLY: &str = "SessionStartReply";
pub const STOP_REQUEST: &str = "SessionStopRequest";
pub const STOP_REPLY: &str = "SessionStopReply";

const FIELD_SECRET: &str = "secret";
const FIELD_ERROR: &str = "error";

/// Error code sent back when the shared secret does not match.
pub const BAD_SECRET: &str = "BAD_SECRET";

/// How long either side waits for the handshake to complete.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Shared secret did not match")]
    BadSecret,

    #[error("Handshake rejected by remote: {0}")]
    Rejected(String),

    #[error("Expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: String },

    #[error("Session is {0:?}, not pending")]
    NotPending(SessionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection open, handshake in progress
    Pending,
    /// Both sides acknowledged
    Active,
    /// Closed after being active
    Stopped,
    /// Never became active
    HandshakeFailed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::HandshakeFailed)
    }
}

/// Build a start request, optionally carrying the shared secret.
pub fn start_request(secret: Option<&str>) -> Message {
    let msg = Message::new(START_REQUEST, PROTOCOL_NAME, MessageType::Request);
    match secret {
        Some(secret) => msg.with_field(FIELD_SECRET, secret),
        None => msg,
    }
}

/// Build an accepting start reply.
pub fn start_reply() -> Message {
    Message::new(START_REPLY, PROTOCOL_NAME, MessageType::Reply)
}

/// Build a refusing start reply.
pub fn start_refusal(code: &str) -> Message {
    start_reply().with_field(FIELD_ERROR, code)
}

pub fn stop_request() -> Message {
    Message::new(STOP_REQUEST, PROTOCOL_NAME, MessageType::Request)
}

pub fn stop_reply() -> Message {
    Message::new(STOP_REPLY, PROTOCOL_NAME, MessageType::Reply)
}

/// Session state for one side of a connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Pending,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Accepting side: validate the dialer's start request.
    ///
    /// On success the session is active and the returned message is the reply
    /// to send. On failure the session is `HandshakeFailed`; the caller should
    /// send [`start_refusal`] for `BadSecret` and tear the connection down.
    pub fn accept_request(
        &mut self,
        msg: &Message,
        expected_secret: Option<&str>,
    ) -> Result<Message, HandshakeError> {
        self.ensure_pending()?;

        if !msg.is(PROTOCOL_NAME, START_REQUEST) {
            self.state = SessionState::HandshakeFailed;
            return Err(HandshakeError::UnexpectedMessage {
                expected: START_REQUEST,
                got: msg.name.clone(),
            });
        }

        if let Some(expected) = expected_secret {
            if msg.field(FIELD_SECRET) != Some(expected) {
                self.state = SessionState::HandshakeFailed;
                return Err(HandshakeError::BadSecret);
            }
        }

        self.state = SessionState::Active;
        Ok(start_reply())
    }

    /// Dialing side: validate the acceptor's start reply.
    pub fn accept_reply(&mut self, msg: &Message) -> Result<(), HandshakeError> {
        self.ensure_pending()?;

        if !msg.is(PROTOCOL_NAME, START_REPLY) {
            self.state = SessionState::HandshakeFailed;
            return Err(HandshakeError::UnexpectedMessage {
                expected: START_REPLY,
                got: msg.name.clone(),
            });
        }

        if let Some(code) = msg.field(FIELD_ERROR) {
            self.state = SessionState::HandshakeFailed;
            return Err(HandshakeError::Rejected(code.to_string()));
        }

        self.state = SessionState::Active;
        Ok(())
    }

    /// Handshake did not finish (timeout, disconnect).
    pub fn fail(&mut self) {
        if self.state == SessionState::Pending {
            self.state = SessionState::HandshakeFailed;
        }
    }

    /// Session closed after being active.
    pub fn stop(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Stopped;
        }
    }

    fn ensure_pending(&self) -> Result<(), HandshakeError> {
        if self.state == SessionState::Pending {
            Ok(())
        } else {
            Err(HandshakeError::NotPending(self.state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_server_accepts_any_request() {
        let mut session = Session::new();
        let reply = session.accept_request(&start_request(None), None).unwrap();

        assert!(reply.is(PROTOCOL_NAME, START_REPLY));
        assert!(session.is_active());
    }

    #[test]
    fn test_matching_secret_accepted() {
        let mut session = Session::new();
        session
            .accept_request(&start_request(Some("s3cret")), Some("s3cret"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let mut session = Session::new();
        let err = session
            .accept_request(&start_request(Some("guess")), Some("s3cret"))
            .unwrap_err();

        assert_eq!(err, HandshakeError::BadSecret);
        assert_eq!(session.state(), SessionState::HandshakeFailed);
        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_missing_secret_fails() {
        let mut session = Session::new();
        let err = session
            .accept_request(&start_request(None), Some("s3cret"))
            .unwrap_err();
        assert_eq!(err, HandshakeError::BadSecret);
    }

    #[test]
    fn test_reply_activates_dialer() {
        let mut session = Session::new();
        session.accept_reply(&start_reply()).unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn test_refusal_fails_dialer() {
        let mut session = Session::new();
        let err = session.accept_reply(&start_refusal(BAD_SECRET)).unwrap_err();

        assert_eq!(err, HandshakeError::Rejected(BAD_SECRET.into()));
        assert_eq!(session.state(), SessionState::HandshakeFailed);
    }

    #[test]
    fn test_unexpected_first_message() {
        let mut session = Session::new();
        let err = session
            .accept_request(&crate::protocol::keepalive::request(), None)
            .unwrap_err();
        assert!(matches!(err, HandshakeError::UnexpectedMessage { .. }));
    }

    #[test]
    fn test_handshake_only_once() {
        let mut session = Session::new();
        session.accept_reply(&start_reply()).unwrap();
        assert_eq!(
            session.accept_reply(&start_reply()),
            Err(HandshakeError::NotPending(SessionState::Active))
        );
    }

    #[test]
    fn test_stop_and_fail() {
        let mut session = Session::new();
        session.fail();
        assert_eq!(session.state(), SessionState::HandshakeFailed);
        session.stop();
        assert_eq!(session.state(), SessionState::HandshakeFailed);

        let mut session = Session::new();
        session.accept_reply(&start_reply()).unwrap();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }
}
