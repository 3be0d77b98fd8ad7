//! Serializable observation of a graph's node state, used for checkpoints and for
//! comparing the graph before and after a touch/restore cycle.
use super::error::GraphError;
use crate::store::{KindTag, NodeValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub name: String,
    pub kind: KindTag,
    pub value: NodeValue,
    pub dirty: bool,
    pub touched: Vec<usize>,
    /// Present only for stochastic nodes whose cache is valid.
    pub ln_probability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub nodes: Vec<NodeState>,
}

impl GraphState {
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string(self).map_err(|e| GraphError::Checkpoint(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Checkpoint(e.to_string()))
    }

    pub fn node(&self, name: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
