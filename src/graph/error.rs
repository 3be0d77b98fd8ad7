//! Defines the error types for the graph module.
use crate::store::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {node} does not exist")]
    UnknownNode { node: NodeId },
    #[error("Cycle detected involving node {node}")]
    CycleDetected { node: NodeId },
    #[error("Kind mismatch at '{name}': expected {expected}, found {found}")]
    KindMismatch { node: NodeId, name: String, expected: String, found: String },
    #[error("Node '{name}' is not stochastic")]
    NotStochastic { node: NodeId, name: String },
    #[error("Node {parent} is not a parent of node {child}")]
    NotAParent { child: NodeId, parent: NodeId },
    #[error("Evaluation failed: {message}")]
    Evaluation { message: String },
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl GraphError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        GraphError::Evaluation { message: message.into() }
    }
}
