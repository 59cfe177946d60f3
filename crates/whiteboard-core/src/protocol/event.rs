//! Event envelope for application traffic.
//!
//! Every application event rides the same two messages: an `EventRequest`
//! carrying an event name plus an opaque payload string, and an optional
//! `EventReply`. This lets share/unshare and board updates share one
//! connection without a protocol per event type.

use super::message::{Message, MessageType};

pub const PROTOCOL_NAME: &str = "EventProtocol";
pub const REQUEST: &str = "EventRequest";
pub const REPLY: &str = "EventReply";

pub(crate) const FIELD_NAME: &str = "eventName";
pub(crate) const FIELD_DATA: &str = "eventData";

/// Wrap an application event.
pub fn request(event_name: &str, event_data: &str) -> Message {
    Message::new(REQUEST, PROTOCOL_NAME, MessageType::Request)
        .with_field(FIELD_NAME, event_name)
        .with_field(FIELD_DATA, event_data)
}

/// Acknowledge an application event. Peers never send one; decoding still
/// accepts it.
#[cfg(test)]
pub fn reply(event_name: &str) -> Message {
    Message::new(REPLY, PROTOCOL_NAME, MessageType::Reply).with_field(FIELD_NAME, event_name)
}

/// Unwrap an `EventRequest` into `(event name, payload)`.
///
/// Returns `None` for any other message. Decoded requests always carry both
/// fields, so `None` here means the caller passed the wrong message.
pub fn unwrap_request(msg: &Message) -> Option<(&str, &str)> {
    if !msg.is(PROTOCOL_NAME, REQUEST) {
        return None;
    }
    Some((msg.field(FIELD_NAME)?, msg.field(FIELD_DATA)?))
}

/// Event names exchanged between peers and the index server.
pub mod names {
    /// peer → index: `"host:port:boardId"` is being shared
    pub const SHARE_BOARD: &str = "SHARE_BOARD";
    /// peer → index: `"host:port:boardId"` is no longer shared
    pub const UNSHARE_BOARD: &str = "UNSHARE_BOARD";
    /// index → peer: a board is available
    pub const SHARING_BOARD: &str = "SHARING_BOARD";
    /// index → peer: a board went away
    pub const UNSHARING_BOARD: &str = "UNSHARING_BOARD";
    /// index → peer: soft error code
    pub const ERROR: &str = "ERROR";

    /// subscriber → owner: start receiving snapshots
    pub const BOARD_LISTEN: &str = "BOARD_LISTEN";
    /// subscriber → owner: stop receiving snapshots
    pub const BOARD_UNLISTEN: &str = "BOARD_UNLISTEN";
    /// subscriber → owner: send the current snapshot once
    pub const GET_BOARD_DATA: &str = "GET_BOARD_DATA";
    /// owner → subscriber: full snapshot
    pub const BOARD_DATA: &str = "BOARD_DATA";
    /// owner → subscriber: full snapshot to adopt unconditionally
    pub const BOARD_DATA_OVERRIDE: &str = "BOARD_DATA_OVERRIDE";
    pub const BOARD_PATH_UPDATE: &str = "BOARD_PATH_UPDATE";
    pub const BOARD_PATH_ACCEPTED: &str = "BOARD_PATH_ACCEPTED";
    pub const BOARD_UNDO_UPDATE: &str = "BOARD_UNDO_UPDATE";
    pub const BOARD_UNDO_ACCEPTED: &str = "BOARD_UNDO_ACCEPTED";
    pub const BOARD_CLEAR_UPDATE: &str = "BOARD_CLEAR_UPDATE";
    pub const BOARD_CLEAR_ACCEPTED: &str = "BOARD_CLEAR_ACCEPTED";
    /// owner → subscriber: the board no longer exists
    pub const BOARD_DELETED: &str = "BOARD_DELETED";
    /// owner → subscriber: error code
    pub const BOARD_ERROR: &str = "BOARD_ERROR";
}

/// Error codes carried by `ERROR` and `BOARD_ERROR`.
pub mod codes {
    pub const DUPLICATE_SHARING_REQUEST: &str = "DUPLICATE_SHARING_REQUEST";
    pub const WHITEBOARD_NOT_EXIST_BUT_UNSHARED: &str = "WHITEBOARD_NOT_EXIST_BUT_UNSHARED";
    pub const MALFORMED_DESCRIPTOR: &str = "MALFORMED_DESCRIPTOR";

    pub const STALE_VERSION: &str = "STALE_VERSION";
    pub const BOARD_NOT_FOUND: &str = "BOARD_NOT_FOUND";
    pub const NOT_BOARD_OWNER: &str = "NOT_BOARD_OWNER";
    pub const MALFORMED_PAYLOAD: &str = "MALFORMED_PAYLOAD";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_request() {
        let msg = request(names::BOARD_LISTEN, "h:1:b");
        assert_eq!(unwrap_request(&msg), Some((names::BOARD_LISTEN, "h:1:b")));
    }

    #[test]
    fn test_unwrap_other_message() {
        assert!(unwrap_request(&reply(names::BOARD_LISTEN)).is_none());
        assert!(unwrap_request(&crate::protocol::keepalive::request()).is_none());
    }

    #[test]
    fn test_empty_payload_allowed() {
        let msg = request(names::BOARD_UNDO_UPDATE, "");
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(unwrap_request(&decoded), Some((names::BOARD_UNDO_UPDATE, "")));
    }
}
