//! Wire message and its JSON codec.
//!
//! Every frame on a connection carries exactly one [`Message`]:
//!
//! ```json
//! {"type":"Request","protocol":"EventProtocol","name":"EventRequest",
//!  "fields":{"eventName":"SHARE_BOARD","eventData":"127.0.0.1:8080:board1"}}
//! ```
//!
//! Decoding is strict: a message is only handed to a protocol once every
//! field that protocol relies on is known to be present.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Maximum encoded message size (8MB). Larger frames are a protocol violation.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Errors raised while decoding a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Malformed message: missing type tag")]
    MissingType,

    #[error("Malformed message: unrecognized type tag {0:?}")]
    UnknownType(String),

    #[error("Malformed message: unknown message {protocol}/{name}")]
    UnknownMessage { protocol: String, name: String },

    #[error("Malformed message: {name} must be a {expected:?}")]
    TypeMismatch { name: String, expected: MessageType },

    #[error("Malformed message: missing field {field:?} in {name}")]
    MissingField { name: String, field: String },

    #[error("Malformed message: field {field:?} in {name} is not a string")]
    WrongKind { name: String, field: String },

    #[error("Malformed message: {size} bytes exceeds maximum of {max}")]
    TooLarge { size: usize, max: usize },
}

/// Whether a message opens an exchange or answers one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Request,
    Reply,
}

impl MessageType {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Request" => Some(Self::Request),
            "Reply" => Some(Self::Reply),
            _ => None,
        }
    }
}

/// Catalogue entry: what a given (protocol, name) pair must look like.
struct MessageSpec {
    protocol: &'static str,
    name: &'static str,
    kind: MessageType,
    required: &'static [&'static str],
}

const CATALOGUE: &[MessageSpec] = &[
    MessageSpec {
        protocol: super::session::PROTOCOL_NAME,
        name: super::session::START_REQUEST,
        kind: MessageType::Request,
        required: &[],
    },
    MessageSpec {
        protocol: super::session::PROTOCOL_NAME,
        name: super::session::START_REPLY,
        kind: MessageType::Reply,
        required: &[],
    },
    MessageSpec {
        protocol: super::session::PROTOCOL_NAME,
        name: super::session::STOP_REQUEST,
        kind: MessageType::Request,
        required: &[],
    },
    MessageSpec {
        protocol: super::session::PROTOCOL_NAME,
        name: super::session::STOP_REPLY,
        kind: MessageType::Reply,
        required: &[],
    },
    MessageSpec {
        protocol: super::keepalive::PROTOCOL_NAME,
        name: super::keepalive::REQUEST,
        kind: MessageType::Request,
        required: &[],
    },
    MessageSpec {
        protocol: super::keepalive::PROTOCOL_NAME,
        name: super::keepalive::REPLY,
        kind: MessageType::Reply,
        required: &[],
    },
    MessageSpec {
        protocol: super::event::PROTOCOL_NAME,
        name: super::event::REQUEST,
        kind: MessageType::Request,
        required: &[super::event::FIELD_NAME, super::event::FIELD_DATA],
    },
    MessageSpec {
        protocol: super::event::PROTOCOL_NAME,
        name: super::event::REPLY,
        kind: MessageType::Reply,
        required: &[],
    },
];

fn lookup(protocol: &str, name: &str) -> Option<&'static MessageSpec> {
    CATALOGUE
        .iter()
        .find(|spec| spec.protocol == protocol && spec.name == name)
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub protocol: String,
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Message {
    /// Build a message with no fields. Protocol modules wrap this in
    /// typed constructors; use those instead where one exists.
    pub fn new(name: &str, protocol: &str, kind: MessageType) -> Self {
        Self {
            kind,
            protocol: protocol.to_string(),
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, builder style.
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Get a field value.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Check the (protocol, name) pair.
    pub fn is(&self, protocol: &str, name: &str) -> bool {
        self.protocol == protocol && self.name == name
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Message serialization should not fail")
    }

    /// Parse and validate JSON bytes against the message catalogue.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge {
                size: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let value: Value =
            serde_json::from_slice(data).map_err(|e| MessageError::Malformed(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(MessageError::Malformed("not a JSON object".into()));
        };

        let kind = match object.remove("type") {
            None | Some(Value::Null) => return Err(MessageError::MissingType),
            Some(Value::String(tag)) => {
                MessageType::parse(&tag).ok_or(MessageError::UnknownType(tag))?
            }
            Some(other) => return Err(MessageError::UnknownType(other.to_string())),
        };

        let protocol = take_string(&mut object, "protocol")?;
        let name = take_string(&mut object, "name")?;

        let spec = lookup(&protocol, &name).ok_or_else(|| MessageError::UnknownMessage {
            protocol: protocol.clone(),
            name: name.clone(),
        })?;
        if spec.kind != kind {
            return Err(MessageError::TypeMismatch {
                name,
                expected: spec.kind,
            });
        }

        let mut fields = BTreeMap::new();
        match object.remove("fields") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    match value {
                        Value::String(s) => {
                            fields.insert(key, s);
                        }
                        _ => {
                            return Err(MessageError::WrongKind { name, field: key });
                        }
                    }
                }
            }
            Some(_) => return Err(MessageError::Malformed("fields is not an object".into())),
        }

        if let Some(missing) = spec.required.iter().find(|f| !fields.contains_key(**f)) {
            return Err(MessageError::MissingField {
                name,
                field: missing.to_string(),
            });
        }

        Ok(Self {
            kind,
            protocol,
            name,
            fields,
        })
    }
}

fn take_string(
    object: &mut serde_json::Map<String, Value>,
    key: &str,
) -> Result<String, MessageError> {
    match object.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(MessageError::Malformed(format!("{} is not a string", key))),
        None => Err(MessageError::Malformed(format!("missing {}", key))),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:?})", self.protocol, self.name, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{event, keepalive, session};

    #[test]
    fn test_event_request_survives_codec() {
        let msg = event::request("SHARE_BOARD", "127.0.0.1:8080:board1");
        let parsed = Message::decode(&msg.encode()).unwrap();

        assert_eq!(parsed, msg);
        assert_eq!(parsed.field("eventName"), Some("SHARE_BOARD"));
        assert_eq!(parsed.field("eventData"), Some("127.0.0.1:8080:board1"));
    }

    #[test]
    fn test_session_request_with_secret_survives_codec() {
        let msg = session::start_request(Some("hunter2"));
        let parsed = Message::decode(&msg.encode()).unwrap();

        assert_eq!(parsed.kind, MessageType::Request);
        assert_eq!(parsed.field("secret"), Some("hunter2"));
    }

    #[test]
    fn test_wire_format() {
        let json = String::from_utf8(keepalive::request().encode()).unwrap();

        assert!(json.contains("\"type\":\"Request\""));
        assert!(json.contains("\"protocol\":\"KeepAliveProtocol\""));
        assert!(json.contains("\"name\":\"KeepAliveRequest\""));
    }

    #[test]
    fn test_field_order_irrelevant() {
        let a = br#"{"type":"Request","protocol":"EventProtocol","name":"EventRequest","fields":{"eventName":"X","eventData":"Y"}}"#;
        let b = br#"{"fields":{"eventData":"Y","eventName":"X"},"name":"EventRequest","protocol":"EventProtocol","type":"Request"}"#;

        assert_eq!(Message::decode(a).unwrap(), Message::decode(b).unwrap());
    }

    #[test]
    fn test_missing_type() {
        let json = br#"{"protocol":"KeepAliveProtocol","name":"KeepAliveRequest"}"#;
        assert_eq!(Message::decode(json), Err(MessageError::MissingType));
    }

    #[test]
    fn test_unknown_type() {
        let json = br#"{"type":"Notify","protocol":"KeepAliveProtocol","name":"KeepAliveRequest"}"#;
        assert_eq!(
            Message::decode(json),
            Err(MessageError::UnknownType("Notify".into()))
        );
    }

    #[test]
    fn test_type_mismatch() {
        let json = br#"{"type":"Reply","protocol":"KeepAliveProtocol","name":"KeepAliveRequest"}"#;
        assert!(matches!(
            Message::decode(json),
            Err(MessageError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let json = br#"{"type":"Request","protocol":"EventProtocol","name":"EventRequest","fields":{"eventName":"X"}}"#;
        assert_eq!(
            Message::decode(json),
            Err(MessageError::MissingField {
                name: "EventRequest".into(),
                field: "eventData".into(),
            })
        );
    }

    #[test]
    fn test_field_of_wrong_kind() {
        let json = br#"{"type":"Request","protocol":"EventProtocol","name":"EventRequest","fields":{"eventName":"X","eventData":42}}"#;
        assert!(matches!(
            Message::decode(json),
            Err(MessageError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_unknown_message() {
        let json = br#"{"type":"Request","protocol":"GossipProtocol","name":"Ping"}"#;
        assert!(matches!(
            Message::decode(json),
            Err(MessageError::UnknownMessage { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(Message::decode(b"not json").is_err());
        assert!(Message::decode(b"[1,2,3]").is_err());
        assert!(Message::decode(b"").is_err());
    }

    #[test]
    fn test_oversized() {
        let data = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            Message::decode(&data),
            Err(MessageError::TooLarge { .. })
        ));
    }
}
