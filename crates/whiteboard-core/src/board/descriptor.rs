//! Board descriptors: `<ownerHost>:<ownerPort>:<boardId>`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("Descriptor must have the form host:port:boardId, got {0:?}")]
    Format(String),

    #[error("Invalid port in descriptor {0:?}")]
    Port(String),
}

/// Globally unique board name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoardDescriptor {
    host: String,
    port: u16,
    board_id: String,
}

impl BoardDescriptor {
    pub fn new(host: &str, port: u16, board_id: &str) -> Result<Self, DescriptorError> {
        let candidate = format!("{}:{}:{}", host, port, board_id);
        if host.is_empty() || board_id.is_empty() || !is_clean(host) || !is_clean(board_id) {
            return Err(DescriptorError::Format(candidate));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            board_id: board_id.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// `host:port` of the owning peer.
    pub fn owner_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Separators of the descriptor and snapshot grammars may not appear inside a part.
fn is_clean(part: &str) -> bool {
    !part.contains(':') && !part.contains('%')
}

impl FromStr for BoardDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [host, port, board_id] = parts.as_slice() else {
            return Err(DescriptorError::Format(s.to_string()));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| DescriptorError::Port(s.to_string()))?;
        Self::new(host, port, board_id)
    }
}

impl fmt::Display for BoardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.board_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let desc: BoardDescriptor = "127.0.0.1:9000:board1700000000000".parse().unwrap();
        assert_eq!(desc.host(), "127.0.0.1");
        assert_eq!(desc.port(), 9000);
        assert_eq!(desc.board_id(), "board1700000000000");
        assert_eq!(desc.owner_address(), "127.0.0.1:9000");
        assert_eq!(desc.to_string(), "127.0.0.1:9000:board1700000000000");
    }

    #[test]
    fn test_missing_parts() {
        assert!(matches!(
            "H:9000".parse::<BoardDescriptor>(),
            Err(DescriptorError::Format(_))
        ));
        assert!(matches!(
            "H:9000:b1:extra".parse::<BoardDescriptor>(),
            Err(DescriptorError::Format(_))
        ));
        assert!("".parse::<BoardDescriptor>().is_err());
    }

    #[test]
    fn test_bad_port() {
        assert!(matches!(
            "H:http:b1".parse::<BoardDescriptor>(),
            Err(DescriptorError::Port(_))
        ));
        assert!(matches!(
            "H:70000:b1".parse::<BoardDescriptor>(),
            Err(DescriptorError::Port(_))
        ));
    }

    #[test]
    fn test_empty_parts() {
        assert!(":9000:b1".parse::<BoardDescriptor>().is_err());
        assert!("H:9000:".parse::<BoardDescriptor>().is_err());
    }

    #[test]
    fn test_snapshot_separator_rejected() {
        assert!(BoardDescriptor::new("H", 9000, "b%1").is_err());
    }
}
