//! The contract every proposal (MCMC kernel) implements.
//!
//! A proposal goes through Idle -> Prepared (`prepare`) -> Proposed (`propose`) and
//! then either Kept (`clean`) or Rolled back (`undo`) before returning to Idle. The
//! proposal owns the values it changes; the scheduler owns touch/keep/restore.
use super::tuning::{TuningParameter, DEFAULT_TARGET_ACCEPTANCE};
use crate::graph::{GraphError, ModelGraph};
use crate::store::NodeId;
use rand::RngCore;
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProposalError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Proposal '{proposal}' does not act on node {node}")]
    NodeNotRegistered { proposal: String, node: NodeId },
    #[error("Cannot swap node {old} for {new}: expected {expected}, found {found}")]
    KindMismatch { old: NodeId, new: NodeId, expected: String, found: String },
    #[error("Invalid proposal configuration: {0}")]
    Configuration(String),
}

/// State shared by every proposal: the nodes it may change and its target
/// acceptance rate. Proposals never own the nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalBase {
    pub nodes: SmallVec<[NodeId; 2]>,
    pub target_acceptance_rate: f64,
}

impl Default for ProposalBase {
    fn default() -> Self { Self::new(DEFAULT_TARGET_ACCEPTANCE) }
}

impl ProposalBase {
    pub fn new(target_acceptance_rate: f64) -> Self {
        Self { nodes: SmallVec::new(), target_acceptance_rate }
    }

    pub fn add_node(&mut self, node: NodeId) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.nodes.retain(|n| *n != node);
    }
}

pub trait Proposal: fmt::Debug + Send {
    /// Name used in move summaries.
    fn name(&self) -> &str;

    fn base(&self) -> &ProposalBase;
    fn base_mut(&mut self) -> &mut ProposalBase;

    /// Nodes this proposal draws new values for.
    fn nodes(&self) -> &[NodeId] { &self.base().nodes }

    fn target_acceptance_rate(&self) -> f64 { self.base().target_acceptance_rate }

    /// Nodes the scheduler touches, keeps and restores around this proposal, each
    /// together with its descendants. Defaults to `nodes()`.
    fn nodes_to_touch(&self, graph: &ModelGraph) -> Vec<NodeId> {
        let _ = graph;
        self.nodes().to_vec()
    }

    /// Side-effect free preparation before `propose`.
    fn prepare(&mut self, graph: &ModelGraph) {
        let _ = graph;
    }

    /// Draws new values and returns the natural log Hastings ratio
    /// `ln q(old | new) - ln q(new | old)`.
    ///
    /// A degenerate draw marks the proposal as failed and returns negative infinity
    /// without touching the graph; the caller then rejects unconditionally.
    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64, ProposalError>;

    /// Puts back the values changed by `propose`. Does nothing after a failed draw.
    fn undo(&mut self, graph: &mut ModelGraph) -> Result<(), ProposalError>;

    /// Drops the transient state after an accepted proposal.
    fn clean(&mut self, graph: &mut ModelGraph);

    /// Whether the last `propose` hit a degenerate draw.
    fn has_failed(&self) -> bool;

    fn tuning_parameter(&self) -> TuningParameter { TuningParameter::NotTunable }

    fn set_tuning_parameter(&mut self, value: f64) {
        let _ = value;
    }

    /// Adjusts the tuning parameter from the acceptance rate observed since the last call.
    fn tune(&mut self, rate: f64) {
        let _ = rate;
    }

    fn is_tunable(&self) -> bool { self.tuning_parameter().is_tunable() }

    /// Human-readable parameter summary with no parse contract.
    fn print_parameter_summary(&self, out: &mut dyn fmt::Write, name_only: bool) -> fmt::Result;

    /// Re-points the proposal-specific node handles. Called by `swap_node` after the
    /// base node list has been updated and the new node has been checked.
    fn swap_node_internal(&mut self, old: NodeId, new: NodeId);

    /// Replaces `old` by `new` after the graph has been restructured.
    ///
    /// The replacement must have the same kind and value shape.
    fn swap_node(&mut self, graph: &ModelGraph, old: NodeId, new: NodeId) -> Result<(), ProposalError> {
        let position = self
            .nodes()
            .iter()
            .position(|n| *n == old)
            .ok_or_else(|| ProposalError::NodeNotRegistered { proposal: self.name().to_string(), node: old })?;
        if new.index() >= graph.node_count() {
            return Err(GraphError::UnknownNode { node: new }.into());
        }

        let expected = (graph.kind_tag(old), graph.value(old).shape());
        let found = (graph.kind_tag(new), graph.value(new).shape());
        if expected != found {
            return Err(ProposalError::KindMismatch {
                old,
                new,
                expected: format!("{:?} {:?}", expected.0, expected.1),
                found: format!("{:?} {:?}", found.0, found.1),
            });
        }

        self.base_mut().nodes[position] = new;
        self.swap_node_internal(old, new);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Proposal>;
}

impl Clone for Box<dyn Proposal> {
    fn clone(&self) -> Self { self.clone_box() }
}
