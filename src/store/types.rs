use crate::model::{Density, Function};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The value held by a node.
///
/// Composite values (`Vector`, `Simplex`) expose their elements to the
/// touched-index bookkeeping; everything else counts as a single element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeValue {
    Real(f64),
    Vector(Vec<f64>),
    /// Non-negative reals summing to one.
    Simplex(Vec<f64>),
    /// A value occupying one of several mutually exclusive mixture slots.
    Slotted { slot: usize, value: f64 },
}

/// Payload-free description of a value's shape, used for kind checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueShape {
    Real,
    Vector(usize),
    Simplex(usize),
    Slotted,
}

impl NodeValue {
    pub fn element_count(&self) -> usize {
        match self {
            NodeValue::Real(_) | NodeValue::Slotted { .. } => 1,
            NodeValue::Vector(v) | NodeValue::Simplex(v) => v.len(),
        }
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            NodeValue::Real(_) => ValueShape::Real,
            NodeValue::Vector(v) => ValueShape::Vector(v.len()),
            NodeValue::Simplex(v) => ValueShape::Simplex(v.len()),
            NodeValue::Slotted { .. } => ValueShape::Slotted,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            NodeValue::Real(x) => Some(*x),
            _ => None,
        }
    }

    /// Elements of a `Vector` or `Simplex`.
    pub fn as_slice(&self) -> Option<&[f64]> {
        match self {
            NodeValue::Vector(v) | NodeValue::Simplex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_slotted(&self) -> Option<(usize, f64)> {
        match self {
            NodeValue::Slotted { slot, value } => Some((*slot, *value)),
            _ => None,
        }
    }
}

impl Default for NodeValue {
    fn default() -> Self { NodeValue::Real(0.0) }
}

/// The role a node plays in the model, carrying the plug-in that evaluates it.
#[derive(Clone)]
pub enum NodeKind {
    Constant,
    Stochastic(Arc<dyn Density>),
    Deterministic(Arc<dyn Function>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindTag {
    Constant,
    Stochastic,
    Deterministic,
}

impl NodeKind {
    pub fn tag(&self) -> KindTag {
        match self {
            NodeKind::Constant => KindTag::Constant,
            NodeKind::Stochastic(_) => KindTag::Stochastic,
            NodeKind::Deterministic(_) => KindTag::Deterministic,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Constant => write!(f, "Constant"),
            NodeKind::Stochastic(d) => write!(f, "Stochastic({})", d.name()),
            NodeKind::Deterministic(func) => write!(f, "Deterministic({})", func.name()),
        }
    }
}

/// Cached state captured on the first touch after a keep/restore.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub value: Option<NodeValue>,
    pub ln_probability: f64,
    pub dirty: bool,
}
