//! Core of a Bayesian MCMC engine over directed acyclic model graphs.
//!
//! Nodes are constants, stochastic variables or deterministic functions of their
//! parents. Proposals change stochastic values; the graph's touch / keep / restore
//! protocol keeps cached values and ln-probabilities consistent across accepted and
//! rejected moves.

pub mod analysis;
pub mod config;
pub mod display;
pub mod graph;
pub mod mcmc;
pub mod model;
pub mod moves;
pub mod store;

pub use config::{ChainConfig, ConfigError};
pub use graph::{GraphError, GraphState, ModelGraph};
pub use mcmc::{run_replicates, Chain, ChainReport, McmcError, MetropolisHastingsMove};
pub use model::{Density, Function};
pub use moves::{Proposal, ProposalError, TuningParameter};
pub use store::{NodeId, NodeValue};
