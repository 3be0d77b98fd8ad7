//! Reversible-jump proposal between the mutually exclusive slots of a mixture
//! variable, learning which slots and values the chain prefers as it runs.
use super::proposal::{Proposal, ProposalBase, ProposalError};
use super::random::uniform01;
use super::tuning::DEFAULT_TARGET_ACCEPTANCE;
use crate::graph::ModelGraph;
use crate::store::{KindTag, NodeId, NodeValue};
use log::{debug, info};
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// One component of a reversible-jump mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MixtureSlot {
    /// The value is pinned to a constant while in this slot.
    Point(f64),
    /// The value is free; `mean` and `sd` give the normal kernel used to draw it
    /// until learned statistics take over.
    Continuous { mean: f64, sd: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptationPhase {
    /// Uniform slot choice, no statistics.
    Cold,
    /// Uniform slot choice, statistics accumulate.
    Learning,
    /// Slot choice and continuous draws follow the learned statistics.
    Adapted,
}

/// Running visit count and Welford mean/variance of the values seen in one slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotStatistics {
    pub visits: u64,
    pub mean: f64,
    m2: f64,
}

impl SlotStatistics {
    fn record(&mut self, x: f64) {
        self.visits += 1;
        let delta = x - self.mean;
        self.mean += delta / self.visits as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance, once at least two values have been seen.
    pub fn variance(&self) -> Option<f64> {
        (self.visits >= 2).then(|| self.m2 / (self.visits - 1) as f64)
    }
}

fn normal_ln_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * (2.0 * PI).ln() - sd.ln() - 0.5 * z * z
}

#[derive(Debug, Clone)]
pub struct AdaptiveReversibleJumpProposal {
    base: ProposalBase,
    variable: NodeId,
    slots: Vec<MixtureSlot>,
    statistics: Vec<SlotStatistics>,

    wait_before_learning: usize,
    wait_before_using: usize,
    max_updates: usize,
    updates: usize,
    num_tried: usize,

    stored_value: f64,
    stored_index: usize,
    has_stored: bool,
    failed: bool,
}

impl AdaptiveReversibleJumpProposal {
    pub fn new(
        graph: &ModelGraph,
        variable: NodeId,
        slots: Vec<MixtureSlot>,
        wait_before_learning: usize,
        wait_before_using: usize,
        max_updates: usize,
    ) -> Result<Self, ProposalError> {
        if variable.index() >= graph.node_count() {
            return Err(crate::graph::GraphError::UnknownNode { node: variable }.into());
        }
        let slot = match (graph.kind_tag(variable), graph.value(variable)) {
            (KindTag::Stochastic, NodeValue::Slotted { slot, .. }) => *slot,
            (kind, value) => {
                let found = format!("{:?} {:?}", kind, value.shape());
                return Err(graph.mismatch(variable, "Stochastic Slotted", &found).into());
            }
        };
        if slot >= slots.len() {
            return Err(ProposalError::Configuration(format!(
                "'{}' occupies slot {} but only {} slots were given",
                graph.name(variable),
                slot,
                slots.len()
            )));
        }
        for s in &slots {
            if let MixtureSlot::Continuous { sd, .. } = s {
                if !(sd.is_finite() && *sd > 0.0) {
                    return Err(ProposalError::Configuration(format!("kernel sd must be positive, got {}", sd)));
                }
            }
        }

        let mut base = ProposalBase::new(DEFAULT_TARGET_ACCEPTANCE);
        base.add_node(variable);
        let statistics = vec![SlotStatistics::default(); slots.len()];
        Ok(Self {
            base,
            variable,
            slots,
            statistics,
            wait_before_learning,
            wait_before_using,
            max_updates,
            updates: 0,
            num_tried: 0,
            stored_value: 0.0,
            stored_index: 0,
            has_stored: false,
            failed: false,
        })
    }

    /// Update count at which the learned kernel takes over. Saturates, so
    /// `usize::MAX` waits mean the proposal never adapts.
    fn learning_ends(&self) -> usize {
        self.wait_before_learning.saturating_add(self.wait_before_using)
    }

    pub fn phase(&self) -> AdaptationPhase {
        if self.updates < self.wait_before_learning {
            AdaptationPhase::Cold
        } else if self.updates < self.learning_ends() {
            AdaptationPhase::Learning
        } else {
            AdaptationPhase::Adapted
        }
    }

    pub fn statistics(&self) -> &[SlotStatistics] { &self.statistics }
    pub fn updates(&self) -> usize { self.updates }
    pub fn num_tried(&self) -> usize { self.num_tried }
    pub fn slots(&self) -> &[MixtureSlot] { &self.slots }

    /// Unnormalized probabilities of jumping from `from` to each slot.
    fn slot_weights(&self, phase: AdaptationPhase, from: usize) -> Vec<f64> {
        (0..self.slots.len())
            .map(|j| match (j == from, phase) {
                (true, _) => 0.0,
                (false, AdaptationPhase::Adapted) => self.statistics[j].visits as f64 + 1.0,
                (false, _) => 1.0,
            })
            .collect()
    }

    fn ln_slot_probability(weights: &[f64], to: usize) -> f64 {
        let total: f64 = weights.iter().sum();
        (weights[to] / total).ln()
    }

    fn sample_slot(weights: &[f64], u: f64) -> usize {
        let total: f64 = weights.iter().sum();
        let target = u * total;
        let mut cumulative = 0.0;
        let mut last = 0;
        for (j, w) in weights.iter().enumerate() {
            if *w > 0.0 {
                cumulative += w;
                last = j;
                if target < cumulative {
                    return j;
                }
            }
        }
        last
    }

    /// Normal kernel (mean, sd) for drawing a value in `slot`.
    fn kernel(&self, phase: AdaptationPhase, slot: usize, mean: f64, sd: f64) -> (f64, f64) {
        if phase == AdaptationPhase::Adapted {
            let stats = &self.statistics[slot];
            if let Some(var) = stats.variance() {
                if var.is_finite() && var > 0.0 {
                    return (stats.mean, var.sqrt());
                }
            }
        }
        (mean, sd)
    }

    /// Draws a value for entering `slot`, returning it with its ln kernel density.
    fn draw_value(&self, phase: AdaptationPhase, slot: usize, rng: &mut dyn RngCore) -> Option<(f64, f64)> {
        match self.slots[slot] {
            MixtureSlot::Point(c) => Some((c, 0.0)),
            MixtureSlot::Continuous { mean, sd } => {
                let (m, s) = self.kernel(phase, slot, mean, sd);
                let normal = Normal::new(m, s).ok()?;
                let x = normal.sample(rng);
                Some((x, normal_ln_pdf(x, m, s)))
            }
        }
    }

    fn ln_value_density(&self, phase: AdaptationPhase, slot: usize, x: f64) -> f64 {
        match self.slots[slot] {
            MixtureSlot::Point(_) => 0.0,
            MixtureSlot::Continuous { mean, sd } => {
                let (m, s) = self.kernel(phase, slot, mean, sd);
                normal_ln_pdf(x, m, s)
            }
        }
    }

    fn fail(&mut self) -> f64 {
        self.failed = true;
        debug!("{}: no valid jump", self.name());
        f64::NEG_INFINITY
    }
}

impl Proposal for AdaptiveReversibleJumpProposal {
    fn name(&self) -> &str { "AdaptiveReversibleJump" }

    fn base(&self) -> &ProposalBase { &self.base }
    fn base_mut(&mut self) -> &mut ProposalBase { &mut self.base }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64, ProposalError> {
        self.failed = false;
        self.has_stored = false;

        let (slot, value) = graph.value(self.variable).as_slotted().ok_or_else(|| {
            graph.mismatch(self.variable, "Slotted", &format!("{:?}", graph.value(self.variable).shape()))
        })?;
        if slot >= self.slots.len() {
            return Err(ProposalError::Configuration(format!("slot {} out of range", slot)));
        }

        self.num_tried += 1;
        if self.updates >= self.wait_before_learning && self.updates < self.max_updates {
            self.statistics[slot].record(value);
        }
        let phase = self.phase();
        if self.updates < self.max_updates {
            self.updates += 1;
            if self.updates == self.learning_ends() {
                info!("{}: switching to learned kernel after {} updates", self.name(), self.updates);
            }
        }

        if self.slots.len() < 2 {
            return Ok(self.fail());
        }

        let forward_weights = self.slot_weights(phase, slot);
        let new_slot = Self::sample_slot(&forward_weights, uniform01(rng));
        let Some((new_value, ln_q_value_forward)) = self.draw_value(phase, new_slot, rng) else {
            return Ok(self.fail());
        };

        let reverse_weights = self.slot_weights(phase, new_slot);
        let ln_q_forward = Self::ln_slot_probability(&forward_weights, new_slot) + ln_q_value_forward;
        let ln_q_reverse =
            Self::ln_slot_probability(&reverse_weights, slot) + self.ln_value_density(phase, slot, value);

        graph.set_value(self.variable, NodeValue::Slotted { slot: new_slot, value: new_value })?;
        self.stored_value = value;
        self.stored_index = slot;
        self.has_stored = true;

        Ok(ln_q_reverse - ln_q_forward)
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<(), ProposalError> {
        if self.failed || !self.has_stored {
            return Ok(());
        }
        graph.set_value(self.variable, NodeValue::Slotted { slot: self.stored_index, value: self.stored_value })?;
        self.has_stored = false;
        Ok(())
    }

    fn clean(&mut self, _graph: &mut ModelGraph) {
        self.has_stored = false;
    }

    fn has_failed(&self) -> bool { self.failed }

    fn print_parameter_summary(&self, out: &mut dyn fmt::Write, name_only: bool) -> fmt::Result {
        write!(out, "updates = ")?;
        if !name_only {
            write!(out, "{} ({:?})", self.updates, self.phase())?;
        }
        Ok(())
    }

    fn swap_node_internal(&mut self, old: NodeId, new: NodeId) {
        if old == self.variable {
            self.variable = new;
        }
    }

    fn clone_box(&self) -> Box<dyn Proposal> { Box::new(self.clone()) }
}
