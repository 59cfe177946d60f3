//! Board model: descriptors, versioned boards, and the per-peer store.

pub mod descriptor;
pub mod store;
pub mod whiteboard;

pub use descriptor::{BoardDescriptor, DescriptorError};
pub use store::{Adoption, BoardSlot, BoardStore};
pub use whiteboard::{BoardError, BoardUpdate, Snapshot, UpdateKind, Whiteboard, WhiteboardPath};
