//! Small densities and functions for unit tests.
use super::error::GraphError;
use crate::model::{Density, Function};
use crate::store::NodeValue;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct Flat;

impl Density for Flat {
    fn name(&self) -> &str { "flat" }
    fn ln_probability(&self, _value: &NodeValue, _parents: &[&NodeValue]) -> Result<f64, GraphError> {
        Ok(0.0)
    }
}

/// Exponential with the rate taken from the first parent.
#[derive(Debug)]
pub struct Exponential;

impl Density for Exponential {
    fn name(&self) -> &str { "exponential" }
    fn ln_probability(&self, value: &NodeValue, parents: &[&NodeValue]) -> Result<f64, GraphError> {
        let rate = parents
            .first()
            .and_then(|p| p.as_real())
            .ok_or_else(|| GraphError::evaluation("exponential needs a real rate"))?;
        let x = value.as_real().ok_or_else(|| GraphError::evaluation("exponential needs a real value"))?;
        if x < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(rate.ln() - rate * x)
    }
}

/// Unnormalized Dirichlet with concentration taken from the first parent.
#[derive(Debug)]
pub struct Dirichlet;

impl Density for Dirichlet {
    fn name(&self) -> &str { "dirichlet" }
    fn ln_probability(&self, value: &NodeValue, parents: &[&NodeValue]) -> Result<f64, GraphError> {
        let alpha = parents
            .first()
            .and_then(|p| p.as_slice())
            .ok_or_else(|| GraphError::evaluation("dirichlet needs a concentration vector"))?;
        let x = value.as_slice().ok_or_else(|| GraphError::evaluation("dirichlet needs a simplex"))?;
        Ok(alpha.iter().zip(x).map(|(a, xi)| (a - 1.0) * xi.ln()).sum())
    }
}

/// `scalar * vector`, recomputing only touched elements unless `ignore_touched` is set.
/// Counts full evaluations so tests can tell the incremental path was taken.
#[derive(Debug, Default)]
pub struct ScaledVector {
    pub full_evaluations: AtomicUsize,
    pub ignore_touched: bool,
}

impl ScaledVector {
    pub fn shared() -> Arc<Self> { Arc::new(Self::default()) }
    /// Ignores touched indices, for use below simplex moves without a bound scalar.
    pub fn recompute_all() -> Arc<Self> { Arc::new(Self { ignore_touched: true, ..Self::default() }) }
    pub fn full_evaluations(&self) -> usize { self.full_evaluations.load(Ordering::SeqCst) }
}

fn scaled_inputs<'a>(parents: &[&'a NodeValue]) -> Result<(f64, &'a [f64]), GraphError> {
    match parents {
        [s, v] => {
            let s = s.as_real().ok_or_else(|| GraphError::evaluation("scale must be real"))?;
            let v = v.as_slice().ok_or_else(|| GraphError::evaluation("scaled operand must be a vector"))?;
            Ok((s, v))
        }
        _ => Err(GraphError::evaluation("scaled vector takes two parents")),
    }
}

impl Function for ScaledVector {
    fn name(&self) -> &str { "scaled_vector" }

    fn evaluate(&self, parents: &[&NodeValue]) -> Result<NodeValue, GraphError> {
        self.full_evaluations.fetch_add(1, Ordering::SeqCst);
        let (s, v) = scaled_inputs(parents)?;
        Ok(NodeValue::Vector(v.iter().map(|x| s * x).collect()))
    }

    fn update(&self, current: &mut NodeValue, parents: &[&NodeValue], touched: &BTreeSet<usize>) -> Result<(), GraphError> {
        let (s, v) = scaled_inputs(parents)?;
        match current {
            NodeValue::Vector(out) if !self.ignore_touched && !touched.is_empty() && out.len() == v.len() => {
                for &i in touched {
                    out[i] = s * v[i];
                }
                Ok(())
            }
            _ => {
                *current = self.evaluate(parents)?;
                Ok(())
            }
        }
    }
}

/// Sum of all elements of the first parent.
#[derive(Debug)]
pub struct Total;

impl Function for Total {
    fn name(&self) -> &str { "total" }
    fn evaluate(&self, parents: &[&NodeValue]) -> Result<NodeValue, GraphError> {
        let v = parents
            .first()
            .and_then(|p| p.as_slice())
            .ok_or_else(|| GraphError::evaluation("total needs a vector"))?;
        Ok(NodeValue::Real(v.iter().sum()))
    }
}
