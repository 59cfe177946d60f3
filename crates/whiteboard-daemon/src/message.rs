//! WebSocket framing for wire messages.
//!
//! Every [`Message`] travels as one binary frame holding its JSON encoding.
//! Text frames are accepted as UTF-8 JSON for the benefit of hand-driven
//! test clients; ping and pong are handled by tungstenite and skipped here.

use tokio_tungstenite::tungstenite::Message as Frame;
use whiteboard_core::protocol::Message;

pub use whiteboard_core::protocol::MAX_MESSAGE_SIZE;

/// What the read loop should do with one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Bytes to decode as a [`Message`]
    Data(Vec<u8>),
    /// Control frame, nothing to do
    Skip,
    /// Remote sent a close frame
    Close,
}

/// Classify a received frame.
pub fn classify(frame: Frame) -> Inbound {
    match frame {
        Frame::Binary(data) => Inbound::Data(data.to_vec()),
        Frame::Text(text) => Inbound::Data(text.into_bytes()),
        Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => Inbound::Skip,
        Frame::Close(_) => Inbound::Close,
    }
}

/// Wrap a message in a binary frame.
pub fn to_frame(msg: &Message) -> Frame {
    Frame::Binary(msg.encode().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_core::protocol::event;

    #[test]
    fn test_binary_frame_carries_json() {
        let msg = event::request("SHARE_BOARD", "127.0.0.1:3200:board1");
        let Inbound::Data(data) = classify(to_frame(&msg)) else {
            panic!("expected data");
        };
        assert_eq!(Message::decode(&data).unwrap(), msg);
    }

    #[test]
    fn test_text_frame_accepted() {
        let json = r#"{"type":"Request","protocol":"KeepAliveProtocol","name":"KeepAliveRequest"}"#;
        let Inbound::Data(data) = classify(Frame::Text(json.into())) else {
            panic!("expected data");
        };
        assert!(Message::decode(&data).is_ok());
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(classify(Frame::Ping(vec![1].into())), Inbound::Skip);
        assert_eq!(classify(Frame::Pong(vec![].into())), Inbound::Skip);
        assert_eq!(classify(Frame::Close(None)), Inbound::Close);
    }
}
