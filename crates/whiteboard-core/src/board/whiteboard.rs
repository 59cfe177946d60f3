//! A single versioned board and its serialized forms.
//!
//! Snapshot grammar: `<descriptor>%<version>%<path>%<path>…`, with a trailing
//! `%` and nothing after it when there are no paths.
//!
//! Update grammar: `<descriptor>%<expectedVersion>%<pathData>`, where
//! `pathData` is empty for undo and clear.

use super::descriptor::{BoardDescriptor, DescriptorError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SEPARATOR: char = '%';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Stale version: expected {expected}, board is at {current}")]
    StaleVersion { expected: u64, current: u64 },

    #[error("Invalid path data {0:?}")]
    InvalidPath(String),

    #[error("Malformed board data {0:?}")]
    Malformed(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// One drawn path, kept opaque. It only has to stay clear of the snapshot
/// separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhiteboardPath(String);

impl WhiteboardPath {
    pub fn new(data: &str) -> Result<Self, BoardError> {
        if data.is_empty() || data.contains(SEPARATOR) {
            return Err(BoardError::InvalidPath(data.to_string()));
        }
        Ok(Self(data.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WhiteboardPath {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for WhiteboardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full state of a board, sent wholesale rather than as a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub descriptor: BoardDescriptor,
    pub version: u64,
    pub paths: Vec<WhiteboardPath>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.descriptor, SEPARATOR, self.version)?;
        if self.paths.is_empty() {
            return write!(f, "{}", SEPARATOR);
        }
        for path in &self.paths {
            write!(f, "{}{}", SEPARATOR, path)?;
        }
        Ok(())
    }
}

impl FromStr for Snapshot {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        let descriptor = parts
            .next()
            .ok_or_else(|| BoardError::Malformed(s.to_string()))?
            .parse()?;
        let version = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| BoardError::Malformed(s.to_string()))?;
        let paths = parts
            .filter(|p| !p.is_empty())
            .map(WhiteboardPath::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            descriptor,
            version,
            paths,
        })
    }
}

/// Which mutation an update carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Path,
    Undo,
    Clear,
}

/// A remote mutation request: `descriptor%expectedVersion%pathData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardUpdate {
    pub descriptor: BoardDescriptor,
    pub expected_version: u64,
    /// Present only for [`UpdateKind::Path`]
    pub path: Option<WhiteboardPath>,
}

impl BoardUpdate {
    pub fn parse(kind: UpdateKind, s: &str) -> Result<Self, BoardError> {
        let mut parts = s.splitn(3, SEPARATOR);
        let descriptor = parts
            .next()
            .ok_or_else(|| BoardError::Malformed(s.to_string()))?
            .parse()?;
        let expected_version = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| BoardError::Malformed(s.to_string()))?;
        let data = parts.next().unwrap_or("");

        let path = match kind {
            UpdateKind::Path => Some(WhiteboardPath::new(data)?),
            UpdateKind::Undo | UpdateKind::Clear => None,
        };

        Ok(Self {
            descriptor,
            expected_version,
            path,
        })
    }
}

impl fmt::Display for BoardUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.descriptor, SEPARATOR, self.expected_version, SEPARATOR
        )?;
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
        }
        Ok(())
    }
}

/// A board held by this peer, either owned (local) or mirrored (remote).
///
/// Every mutation is gated on the caller's expected version: it applies only
/// when `expected == version`, and then bumps the version by exactly one.
/// Callers hold the board's lock across the whole call, which makes
/// check-and-apply indivisible.
#[derive(Debug, Clone)]
pub struct Whiteboard {
    descriptor: BoardDescriptor,
    version: u64,
    paths: Vec<WhiteboardPath>,
    shared: bool,
    remote: bool,
}

impl Whiteboard {
    /// A new, empty board owned by this peer.
    pub fn local(descriptor: BoardDescriptor) -> Self {
        Self {
            descriptor,
            version: 0,
            paths: Vec::new(),
            shared: false,
            remote: false,
        }
    }

    /// A mirror built from an owner's snapshot.
    pub fn mirror(snapshot: Snapshot) -> Self {
        Self {
            descriptor: snapshot.descriptor,
            version: snapshot.version,
            paths: snapshot.paths,
            shared: false,
            remote: true,
        }
    }

    pub fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn paths(&self) -> &[WhiteboardPath] {
        &self.paths
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn set_shared(&mut self, shared: bool) {
        self.shared = shared;
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            descriptor: self.descriptor.clone(),
            version: self.version,
            paths: self.paths.clone(),
        }
    }

    /// Append a path if `expected` is the current version.
    pub fn add_path(&mut self, path: WhiteboardPath, expected: u64) -> Result<u64, BoardError> {
        self.check(expected)?;
        self.paths.push(path);
        Ok(self.bump())
    }

    /// Remove the last path if `expected` is the current version.
    ///
    /// Undo on an empty board still counts as a mutation.
    pub fn undo(&mut self, expected: u64) -> Result<u64, BoardError> {
        self.check(expected)?;
        self.paths.pop();
        Ok(self.bump())
    }

    /// Remove every path if `expected` is the current version.
    pub fn clear(&mut self, expected: u64) -> Result<u64, BoardError> {
        self.check(expected)?;
        self.paths.clear();
        Ok(self.bump())
    }

    /// Apply an update of the given kind through the same gate.
    pub fn apply(&mut self, kind: UpdateKind, update: &BoardUpdate) -> Result<u64, BoardError> {
        match (kind, &update.path) {
            (UpdateKind::Path, Some(path)) => self.add_path(path.clone(), update.expected_version),
            (UpdateKind::Path, None) => Err(BoardError::InvalidPath(String::new())),
            (UpdateKind::Undo, _) => self.undo(update.expected_version),
            (UpdateKind::Clear, _) => self.clear(update.expected_version),
        }
    }

    fn check(&self, expected: u64) -> Result<(), BoardError> {
        if expected != self.version {
            return Err(BoardError::StaleVersion {
                expected,
                current: self.version,
            });
        }
        Ok(())
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}
