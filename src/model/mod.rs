//! Plug-in points for the model mathematics.
//!
//! Concrete distributions and deterministic functions live outside this crate;
//! the graph only needs to ask them for a log density or a recomputed value.
use crate::graph::GraphError;
use crate::store::NodeValue;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// The distribution attached to a stochastic node.
pub trait Density: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Natural log density of `value` given the current values of the node's parents,
    /// in the order the parents were registered.
    fn ln_probability(&self, value: &NodeValue, parents: &[&NodeValue]) -> Result<f64, GraphError>;
}

/// The transformation computed by a deterministic node.
pub trait Function: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Full recomputation from the parent values.
    fn evaluate(&self, parents: &[&NodeValue]) -> Result<NodeValue, GraphError>;

    /// Incremental recomputation.
    ///
    /// `touched` holds the element indices a proposal marked on this node. An empty
    /// set always means "recompute everything". A non-empty set is a complete change
    /// set only when the proposal leaves every other element's inputs fixed, as the
    /// simplex move does with a bound scalar. Without one, renormalization moves every
    /// coordinate while only the chosen index is marked, so a function that refreshes
    /// only the touched elements must sit below scalar-bound simplex moves alone.
    fn update(
        &self,
        current: &mut NodeValue,
        parents: &[&NodeValue],
        touched: &BTreeSet<usize>,
    ) -> Result<(), GraphError> {
        let _ = touched;
        *current = self.evaluate(parents)?;
        Ok(())
    }
}
