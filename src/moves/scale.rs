//! Multiplicative scaling of a positive real value.
use super::proposal::{Proposal, ProposalBase, ProposalError};
use super::random::uniform01;
use super::tuning::{StepSize, TuningParameter};
use crate::graph::ModelGraph;
use crate::store::{KindTag, NodeId, NodeValue};
use log::debug;
use rand::RngCore;
use std::fmt;

/// Proposes `x' = x * exp(lambda * (u - 0.5))` with Hastings ratio `ln(x' / x)`.
#[derive(Debug, Clone)]
pub struct ScaleProposal {
    base: ProposalBase,
    variable: NodeId,
    step: StepSize,
    stored_value: Option<f64>,
    failed: bool,
}

impl ScaleProposal {
    pub fn new(graph: &ModelGraph, variable: NodeId, lambda: f64, target_acceptance_rate: f64) -> Result<Self, ProposalError> {
        if variable.index() >= graph.node_count() {
            return Err(crate::graph::GraphError::UnknownNode { node: variable }.into());
        }
        if graph.kind_tag(variable) != KindTag::Stochastic || graph.value(variable).as_real().is_none() {
            let found = format!("{:?} {:?}", graph.kind_tag(variable), graph.value(variable).shape());
            return Err(graph.mismatch(variable, "Stochastic Real", &found).into());
        }
        let mut base = ProposalBase::new(target_acceptance_rate);
        base.add_node(variable);
        Ok(Self { base, variable, step: StepSize::new(lambda, target_acceptance_rate), stored_value: None, failed: false })
    }

    pub fn lambda(&self) -> f64 { self.step.value }
}

impl Proposal for ScaleProposal {
    fn name(&self) -> &str { "Scale" }

    fn base(&self) -> &ProposalBase { &self.base }
    fn base_mut(&mut self) -> &mut ProposalBase { &mut self.base }

    fn propose(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<f64, ProposalError> {
        self.failed = false;
        self.stored_value = None;

        let current = graph
            .value(self.variable)
            .as_real()
            .ok_or_else(|| graph.mismatch(self.variable, "Real", &format!("{:?}", graph.value(self.variable).shape())))?;

        let u = uniform01(rng);
        let scaling_factor = (self.step.value * (u - 0.5)).exp();
        let proposed = current * scaling_factor;
        if !proposed.is_finite() || proposed == 0.0 {
            self.failed = true;
            debug!("Scale: degenerate draw from {}", current);
            return Ok(f64::NEG_INFINITY);
        }

        graph.set_value(self.variable, NodeValue::Real(proposed))?;
        self.stored_value = Some(current);
        Ok(scaling_factor.ln())
    }

    fn undo(&mut self, graph: &mut ModelGraph) -> Result<(), ProposalError> {
        if self.failed {
            return Ok(());
        }
        if let Some(x) = self.stored_value.take() {
            graph.set_value(self.variable, NodeValue::Real(x))?;
        }
        Ok(())
    }

    fn clean(&mut self, _graph: &mut ModelGraph) {
        self.stored_value = None;
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
        if old == self.variable {
            self.variable = new;
        }
    }

    fn clone_box(&self) -> Box<dyn Proposal> { Box::new(self.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::Exponential;
    use crate::moves::random::ScriptedUniforms;
    use crate::moves::tuning::DEFAULT_TARGET_ACCEPTANCE;
    use std::sync::Arc;

    fn setup(x: f64) -> (ModelGraph, NodeId) {
        let mut graph = ModelGraph::new();
        let one = graph.add_constant("one", NodeValue::Real(1.0));
        let x = graph.add_stochastic("x", Arc::new(Exponential), NodeValue::Real(x), &[one]).unwrap();
        (graph, x)
    }

    #[test]
    fn test_scale_and_hastings() {
        let (mut graph, x) = setup(2.0);
        let mut p = ScaleProposal::new(&graph, x, 2.0, DEFAULT_TARGET_ACCEPTANCE).unwrap();
        let mut rng = ScriptedUniforms::new(&[0.75]);

        let ln_h = p.propose(&mut graph, &mut rng).unwrap();
        assert!((ln_h - 0.5).abs() < 1e-12);
        assert!((graph.value(x).as_real().unwrap() - 2.0 * 0.5f64.exp()).abs() < 1e-12);

        p.undo(&mut graph).unwrap();
        assert_eq!(graph.value(x), &NodeValue::Real(2.0));
    }

    #[test]
    fn test_zero_value_fails() {
        let (mut graph, x) = setup(0.0);
        let mut p = ScaleProposal::new(&graph, x, 1.0, DEFAULT_TARGET_ACCEPTANCE).unwrap();
        let mut rng = ScriptedUniforms::new(&[0.25]);
        assert_eq!(p.propose(&mut graph, &mut rng).unwrap(), f64::NEG_INFINITY);
        assert!(p.has_failed());
        p.undo(&mut graph).unwrap();
        assert_eq!(graph.value(x), &NodeValue::Real(0.0));
    }
}
