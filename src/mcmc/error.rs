//! Defines the error types for running chains.
use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::moves::ProposalError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum McmcError {
    #[error(transparent)]
    Proposal(#[from] ProposalError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("A chain needs at least one move with positive weight")]
    NoMoves,
    #[error("Move '{name}' has invalid weight {weight}")]
    InvalidWeight { name: String, weight: f64 },
}
