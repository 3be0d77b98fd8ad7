//! Arena storage for model nodes.
pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{KindTag, NodeId, NodeKind, NodeValue, Snapshot, ValueShape};
