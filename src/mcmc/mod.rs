//! Metropolis–Hastings moves and the chain driver built on the proposal contract.
pub mod chain;
pub mod error;
pub mod mh;

pub use chain::{run_replicates, Chain, ChainReport, Sample};
pub use error::McmcError;
pub use mh::{MetropolisHastingsMove, MoveSummary};
