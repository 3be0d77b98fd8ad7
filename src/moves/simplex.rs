//! Rescales a single element of a simplex, optionally carrying a scalar along so
//! that `scalar * simplex` only changes at the chosen element.
use super::proposal::{Proposal, ProposalBase, ProposalError};
use super::random::{uniform01, uniform_index};
use super::tuning::{StepSize, TuningParameter};
use crate::graph::ModelGraph;
use crate::store::{KindTag, NodeId, NodeValue};
use log::{debug, warn};
use rand::RngCore;
use std::collections::BTreeSet;
use std::fmt;

/// Renormalized coordinates below this value count as a degenerate draw.
const MIN_SIMPLEX_ELEMENT: f64 = 1e-100;

/// Element-aligned deterministic descendants get the chosen index marked as touched
/// with or without a bound scalar. The mark names every changed element of
/// `scalar * simplex` only when a scalar is bound; otherwise all coordinates move and
/// descendants must recompute in full (see `Function::update`).
#[derive(Debug, Clone)]
pub struct SimplexElementScaleProposal {
    base: ProposalBase,
    simplex: NodeId,
    scalar: Option<NodeId>,
    step: StepSize,
    /// Restricts the element choice when non-empty.
    indices: BTreeSet<usize>,

    // Undo state, alive between `propose` and `undo`/`clean`.
    stored_simplex: Option<Vec<f64>>,
    stored_scalar: Option<f64>,
    chosen_index: Option<usize>,
    failed: bool,
}

impl SimplexElementScaleProposal {
    pub fn new(graph: &ModelGraph, simplex: NodeId, lambda: f64, target_acceptance_rate: f64) -> Result<Self, ProposalError> {
        expect_stochastic(graph, simplex, "Stochastic Simplex", |v| matches!(v, NodeValue::Simplex(_)))?;
        let mut base = ProposalBase::new(target_acceptance_rate);
        base.add_node(simplex);
        Ok(Self {
            base,
            simplex,
            scalar: None,
            step: StepSize::new(lambda, target_acceptance_rate),
            indices: BTreeSet::new(),
            stored_simplex: None,
            stored_scalar: None,
            chosen_index: None,
            failed: false,
        })
    }

    /// Binds a positive scalar that is rescaled with the simplex's new sum.
    pub fn with_scalar(mut self, graph: &ModelGraph, scalar: NodeId) -> Result<Self, ProposalError> {
        expect_stochastic(graph, scalar, "Stochastic Real", |v| matches!(v, NodeValue::Real(_)))?;
        self.scalar = Some(scalar);
        self.base.add_node(scalar);
        Ok(self)
    }

    /// Restricts the element choice to `index`. Out-of-range indices are ignored.
    pub fn add_index(&mut self, graph: &ModelGraph, index: usize) {
        let k = graph.element_count(self.simplex);
        if index < k {
            self.indices.insert(index);
        } else {
            warn!("ignoring index {} for a simplex of {} elements", index, k);
        }
    }

    pub fn indices(&self) -> &BTreeSet<usize> { &self.indices }
    pub fn lambda(&self) -> f64 { self.step.value }
    pub fn chosen_index(&self) -> Option<usize> { self.chosen_index }
    pub fn simplex(&self) -> NodeId { self.simplex }
    pub fn scalar(&self) -> Option<NodeId> { self.scalar }

    fn choose_index(&self, rng: &mut dyn RngCore, k: usize) -> usize {
        if self.indices.is_empty() {
            return uniform_index(rng, k);
        }
        // A single candidate needs no draw.
        let position = if self.indices.len() > 1 { uniform_index(rng, self.indices.len()) } else { 0 };
        self.indices.iter().nth(position).copied().unwrap_or(0)
    }

    /// Deterministic descendants with one element per simplex coordinate.
    fn element_aligned_descendants(&self, graph: &ModelGraph, k: usize) -> Vec<NodeId> {
        graph
            .find_unique_descendants(self.simplex)
            .into_iter()
            .filter(|&d| graph.kind_tag(d) == KindTag::Deterministic && graph.element_count(d) == k)
            .collect()
    }

    fn clear_touched(&self, graph: &mut ModelGraph, k: usize) {
        for d in self.element_aligned_descendants(graph, k) {
            graph.clear_touched_element_indices(d);
        }
    }

    fn fail(&mut self) -> f64 {
        self.failed = true;
        debug!("{}: degenerate draw", self.name());
        f64::NEG_INFINITY
    }
}

fn expect_stochastic(
    graph: &ModelGraph,
    id: NodeId,
    expected: &str,
    shape_ok: impl Fn(&NodeValue) -> bool,
) -> Result<(), ProposalError> {
    if id.index() >= graph.node_count() {
        return Err(crate::graph::GraphError::UnknownNode { node: id }.into());
    }
    if graph.kind_tag(id) != KindTag::Stochastic || !shape_ok(graph.value(id)) {
        let found = format!("{:?} {:?}", graph.kind_tag(id), graph.value(id).shape());
        return Err(graph.mismatch(id, expected, &found).into());
    }
    Ok(())
}

impl Proposal for SimplexElementScaleProposal {
    fn name(&self) -> &str { "SingleElementScaleSimplex" }

    fn base(&self) -> &ProposalBase { &self.base }
    fn base_mut(&mut self) -> &mut ProposalBase { &mut self.base }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64, ProposalError> {
        self.failed = false;
        self.chosen_index = None;
        self.stored_simplex = None;
        self.stored_scalar = None;

        let current = match graph.value(self.simplex) {
            NodeValue::Simplex(v) => v.clone(),
            other => {
                let found = format!("{:?}", other.shape());
                return Err(graph.mismatch(self.simplex, "Simplex", &found).into());
            }
        };
        let k = current.len();
        if k == 0 {
            return Ok(self.fail());
        }

        let chosen = self.choose_index(rng, k);
        let value_current = current[chosen];

        let u = uniform01(rng);
        let scaling_factor = (self.step.value * (u - 0.5)).exp();
        let value_new = value_current * scaling_factor;

        // The old simplex sums to one, so only the changed element moves the sum.
        let sum_new = value_new - value_current + 1.0;
        let mut proposed = current.clone();
        proposed[chosen] = value_new;
        for x in proposed.iter_mut() {
            *x /= sum_new;
            if !(*x >= MIN_SIMPLEX_ELEMENT) {
                return Ok(self.fail());
            }
        }

        let mut ln_hastings = scaling_factor.ln() - sum_new.ln() * k as f64;

        let scalar_current = match self.scalar {
            Some(s) => Some(
                graph
                    .value(s)
                    .as_real()
                    .ok_or_else(|| graph.mismatch(s, "Real", &format!("{:?}", graph.value(s).shape())))?,
            ),
            None => None,
        };

        graph.set_value(self.simplex, NodeValue::Simplex(proposed))?;
        self.stored_simplex = Some(current);
        self.chosen_index = Some(chosen);

        if let (Some(s), Some(x)) = (self.scalar, scalar_current) {
            graph.set_value(s, NodeValue::Real(x * sum_new))?;
            self.stored_scalar = Some(x);
            ln_hastings += sum_new.ln();
        }

        for d in self.element_aligned_descendants(graph, k) {
            graph.add_touched_element_index(d, chosen);
        }

        Ok(ln_hastings)
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<(), ProposalError> {
        if self.failed {
            return Ok(());
        }
        if let Some(previous) = self.stored_simplex.take() {
            let k = previous.len();
            graph.set_value(self.simplex, NodeValue::Simplex(previous))?;
            if let (Some(s), Some(x)) = (self.scalar, self.stored_scalar.take()) {
                graph.set_value(s, NodeValue::Real(x))?;
            }
            self.clear_touched(graph, k);
        }
        Ok(())
    }

    fn clean(&mut self, graph: &mut ModelGraph) {
        if !self.failed {
            if let Some(previous) = &self.stored_simplex {
                self.clear_touched(graph, previous.len());
            }
        }
        self.stored_simplex = None;
        self.stored_scalar = None;
    }

    fn has_failed(&self) -> bool { self.failed }

    fn tuning_parameter(&self) -> TuningParameter { TuningParameter::Tunable(self.step.value) }

    fn set_tuning_parameter(&mut self, value: f64) { self.step.value = value; }

    fn tune(&mut self, rate: f64) { self.step.tune(rate); }

    fn print_parameter_summary(&self, out: &mut dyn fmt::Write, name_only: bool) -> fmt::Result {
        write!(out, "lambda = ")?;
        if !name_only {
            write!(out, "{}", self.step.value)?;
        }
        Ok(())
    }

    fn swap_node_internal(&mut self, old: NodeId, new: NodeId) {
        if old == self.simplex {
            self.simplex = new;
        } else if self.scalar == Some(old) {
            self.scalar = Some(new);
        }
    }

    fn clone_box(&self) -> Box<dyn Proposal> { Box::new(self.clone()) }
}
