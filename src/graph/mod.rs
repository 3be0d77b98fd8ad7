//! The model graph: node values, dependency edges and the touch / keep / restore protocol.
pub mod dag;
pub mod error;
pub mod state;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export key types for convenient access
pub use dag::ModelGraph;
pub use error::GraphError;
pub use state::{GraphState, NodeState};
