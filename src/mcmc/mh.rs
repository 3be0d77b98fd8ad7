//! A proposal wrapped in the Metropolis–Hastings accept/reject step.
use super::error::McmcError;
use crate::graph::ModelGraph;
use crate::moves::random::uniform01;
use crate::moves::{Proposal, TuningParameter};
use crate::store::NodeId;
use log::{debug, info};
use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct MetropolisHastingsMove {
    proposal: Box<dyn Proposal>,
    weight: f64,
    /// Counters since the last `auto_tune`.
    tried: u64,
    accepted: u64,
    tried_total: u64,
    accepted_total: u64,
}

/// Serializable snapshot of a move's counters and parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveSummary {
    pub name: String,
    pub weight: f64,
    pub tried: u64,
    pub accepted: u64,
    pub parameter: String,
    pub tuning_parameter: Option<f64>,
}

impl MoveSummary {
    pub fn acceptance_rate(&self) -> f64 {
        if self.tried == 0 {
            0.0
        } else {
            self.accepted as f64 / self.tried as f64
        }
    }
}

/// Each node the proposal changes followed by its descendants, without repeats.
fn affected_nodes(graph: &ModelGraph, nodes: &[NodeId]) -> Vec<NodeId> {
    let mut affected: Vec<NodeId> = Vec::new();
    for &n in nodes {
        for id in std::iter::once(n).chain(graph.find_unique_descendants(n)) {
            if !affected.contains(&id) {
                affected.push(id);
            }
        }
    }
    affected
}

impl MetropolisHastingsMove {
    pub fn new(proposal: Box<dyn Proposal>, weight: f64) -> Self {
        Self { proposal, weight, tried: 0, accepted: 0, tried_total: 0, accepted_total: 0 }
    }

    pub fn name(&self) -> &str { self.proposal.name() }
    pub fn weight(&self) -> f64 { self.weight }
    pub fn proposal(&self) -> &dyn Proposal { self.proposal.as_ref() }
    pub fn proposal_mut(&mut self) -> &mut dyn Proposal { self.proposal.as_mut() }
    pub fn tried_total(&self) -> u64 { self.tried_total }
    pub fn accepted_total(&self) -> u64 { self.accepted_total }

    /// Runs one proposal through to acceptance or rejection. Returns whether it was accepted.
    ///
    /// `heat` scales the change in ln-probability; the Hastings ratio is not heated.
    pub fn perform(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore, heat: f64) -> Result<bool, McmcError> {
        self.proposal.prepare(graph);
        let nodes = self.proposal.nodes_to_touch(graph);
        let affected = affected_nodes(graph, &nodes);
        let ln_before = graph.ln_probability_of(&affected)?;

        self.tried += 1;
        self.tried_total += 1;

        let ln_hastings = self.proposal.propose(graph, rng)?;
        if self.proposal.has_failed() || ln_hastings == f64::NEG_INFINITY {
            self.proposal.undo(graph)?;
            debug!("{}: rejected (failed draw)", self.name());
            return Ok(false);
        }

        for &n in &nodes {
            graph.touch_with_descendants(n);
        }
        let ln_after = match graph.ln_probability_of(&affected) {
            Ok(ln) => ln,
            Err(e) => {
                self.reject(graph, &nodes)?;
                return Err(e.into());
            }
        };

        let ln_acceptance = heat * (ln_after - ln_before) + ln_hastings;
        let u = uniform01(rng);
        if u.ln() < ln_acceptance {
            for &n in &nodes {
                graph.keep(n)?;
            }
            self.proposal.clean(graph);
            self.accepted += 1;
            self.accepted_total += 1;
            debug!("{}: accepted (ln alpha = {:.4})", self.name(), ln_acceptance);
            Ok(true)
        } else {
            self.reject(graph, &nodes)?;
            debug!("{}: rejected (ln alpha = {:.4})", self.name(), ln_acceptance);
            Ok(false)
        }
    }

    fn reject(&mut self, graph: &mut ModelGraph, nodes: &[NodeId]) -> Result<(), McmcError> {
        let undone = self.proposal.undo(graph);
        for &n in nodes {
            graph.restore(n);
        }
        Ok(undone?)
    }

    /// Feeds the acceptance rate since the last call to the proposal and starts a new window.
    pub fn auto_tune(&mut self) {
        if self.tried == 0 {
            return;
        }
        let rate = self.accepted as f64 / self.tried as f64;
        if self.proposal.is_tunable() {
            let before = self.proposal.tuning_parameter();
            self.proposal.tune(rate);
            if let (TuningParameter::Tunable(a), TuningParameter::Tunable(b)) = (before, self.proposal.tuning_parameter()) {
                info!("{}: acceptance {:.3}, tuning {} -> {}", self.name(), rate, a, b);
            }
        }
        self.tried = 0;
        self.accepted = 0;
    }

    pub fn summary(&self) -> MoveSummary {
        let mut parameter = String::new();
        let _ = self.proposal.print_parameter_summary(&mut parameter, false);
        MoveSummary {
            name: self.name().to_string(),
            weight: self.weight,
            tried: self.tried_total,
            accepted: self.accepted_total,
            parameter,
            tuning_parameter: self.proposal.tuning_parameter().value(),
        }
    }
}
