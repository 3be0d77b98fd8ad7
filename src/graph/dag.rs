//! dag.rs
//! The model graph and its dirty-propagation protocol (touch / keep / restore).

use super::error::GraphError;
use super::state::{GraphState, NodeState};
use crate::analysis::topology;
use crate::model::{Density, Function};
use crate::store::{KindTag, NodeId, NodeKind, NodeValue, Registry, Snapshot};
use log::trace;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A probabilistic graphical model: constants, stochastic variables and
/// deterministic transformations connected by dependency edges.
///
/// Cached deterministic values and stochastic ln-probabilities are trustworthy
/// exactly when the node is not dirty. Nothing here propagates on its own: the
/// caller touches, then keeps or restores.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    pub(crate) store: Registry,
}

impl ModelGraph {
    pub fn new() -> Self { Self::default() }

    pub fn add_constant(&mut self, name: &str, value: NodeValue) -> NodeId {
        self.store.add_node(NodeKind::Constant, value, &[], name)
    }

    pub fn add_stochastic(
        &mut self,
        name: &str,
        density: Arc<dyn Density>,
        value: NodeValue,
        parents: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.check_all(parents)?;
        Ok(self.store.add_node(NodeKind::Stochastic(density), value, parents, name))
    }

    /// Adds a deterministic node and evaluates it immediately.
    pub fn add_deterministic(
        &mut self,
        name: &str,
        function: Arc<dyn Function>,
        parents: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        self.check_all(parents)?;
        for &p in parents {
            if self.kind_tag(p) == KindTag::Deterministic {
                self.refresh(p)?;
            }
        }
        let value = {
            let parent_values: Vec<&NodeValue> = parents.iter().map(|p| &self.store.values[p.index()]).collect();
            function.evaluate(&parent_values)?
        };
        Ok(self.store.add_node(NodeKind::Deterministic(function), value, parents, name))
    }

    pub fn node_count(&self) -> usize { self.store.count() }

    // --- Accessors ---
    // Accessors and the touch/restore primitives index the arena directly: they
    // panic on a `NodeId` this graph did not hand out. Fallible entry points
    // (`set_value`, `keep`, `ln_probability`, ...) return `UnknownNode` instead.
    pub fn name(&self, id: NodeId) -> &str { &self.store.names[id.index()] }
    pub fn kind_tag(&self, id: NodeId) -> KindTag { self.store.kinds[id.index()].tag() }
    pub fn parents(&self, id: NodeId) -> &[NodeId] { self.store.get_parents(id) }
    pub fn children(&self, id: NodeId) -> &[NodeId] { self.store.get_children(id) }
    pub fn is_dirty(&self, id: NodeId) -> bool { self.store.dirty[id.index()] }
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> { self.store.find_by_name(name) }

    pub fn touched_element_indices(&self, id: NodeId) -> &BTreeSet<usize> {
        &self.store.touched[id.index()]
    }

    /// The stored value. For a dirty deterministic node this is the stale cache;
    /// use [`ModelGraph::current_value`] to bring it up to date first.
    pub fn value(&self, id: NodeId) -> &NodeValue { &self.store.values[id.index()] }

    pub fn current_value(&mut self, id: NodeId) -> Result<&NodeValue, GraphError> {
        self.check(id)?;
        self.refresh(id)?;
        Ok(&self.store.values[id.index()])
    }

    pub fn element_count(&self, id: NodeId) -> usize { self.value(id).element_count() }

    /// Assigns a new value to a constant or stochastic node. The shape must match the
    /// current one. Nothing is marked dirty.
    pub fn set_value(&mut self, id: NodeId, value: NodeValue) -> Result<(), GraphError> {
        self.check(id)?;
        let idx = id.index();
        if self.kind_tag(id) == KindTag::Deterministic {
            return Err(self.mismatch(id, "Constant or Stochastic", "Deterministic"));
        }
        let current = self.store.values[idx].shape();
        if current != value.shape() {
            return Err(self.mismatch(id, &format!("{:?}", current), &format!("{:?}", value.shape())));
        }
        self.store.values[idx] = value;
        Ok(())
    }

    // --- Dirty Propagation ---

    pub fn find_unique_descendants(&self, id: NodeId) -> Vec<NodeId> {
        topology::unique_descendants(&self.store, id)
    }

    /// Every node, parents before children.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        topology::sort(&self.store)
    }

    /// Marks a node dirty. The first touch after a keep/restore remembers the
    /// cached state so that `restore` can put it back.
    ///
    /// Panics if `id` is not a node of this graph.
    pub fn touch(&mut self, id: NodeId) {
        let idx = id.index();
        let value = match self.store.kinds[idx] {
            NodeKind::Constant => return,
            NodeKind::Deterministic(_) => Some(&self.store.values[idx]),
            NodeKind::Stochastic(_) => None,
        };
        if self.store.snapshots[idx].is_none() {
            self.store.snapshots[idx] = Some(Snapshot {
                value: value.cloned(),
                ln_probability: self.store.ln_probability[idx],
                dirty: self.store.dirty[idx],
            });
        }
        self.store.dirty[idx] = true;
        trace!("touch '{}'", self.store.names[idx]);
    }

    /// Touches `id` and every unique descendant.
    pub fn touch_with_descendants(&mut self, id: NodeId) {
        self.touch(id);
        for d in self.find_unique_descendants(id) {
            self.touch(d);
        }
    }

    /// Panics if `id` is not a node of this graph.
    pub fn add_touched_element_index(&mut self, id: NodeId, index: usize) {
        self.store.touched[id.index()].insert(index);
    }

    /// Panics if `id` is not a node of this graph.
    pub fn clear_touched_element_indices(&mut self, id: NodeId) {
        self.store.touched[id.index()].clear();
    }

    /// Commits the current state of `id` and its descendants: dirty caches are
    /// recomputed, then dirty flags, touched indices and snapshots are cleared.
    pub fn keep(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.check(id)?;
        let mut affected = vec![id];
        affected.extend(self.find_unique_descendants(id));
        for &node in &affected {
            self.refresh(node)?;
        }
        for node in affected {
            let idx = node.index();
            self.store.snapshots[idx] = None;
            self.store.touched[idx].clear();
        }
        trace!("keep '{}'", self.name(id));
        Ok(())
    }

    /// Rolls `id` and its descendants back to the caches captured at their first touch.
    ///
    /// Stochastic values are not part of the snapshot: the proposal that changed
    /// them puts them back (`undo`) before the restore.
    ///
    /// Panics if `id` is not a node of this graph.
    pub fn restore(&mut self, id: NodeId) {
        let mut affected = vec![id];
        affected.extend(self.find_unique_descendants(id));
        for node in affected {
            let idx = node.index();
            if let Some(snapshot) = self.store.snapshots[idx].take() {
                if let Some(value) = snapshot.value {
                    self.store.values[idx] = value;
                }
                self.store.ln_probability[idx] = snapshot.ln_probability;
                self.store.dirty[idx] = snapshot.dirty;
            }
            self.store.touched[idx].clear();
        }
        trace!("restore '{}'", self.name(id));
    }

    /// Brings a dirty node's cache up to date, refreshing dirty deterministic
    /// parents first. The snapshot is left alone so a later restore still works.
    fn refresh(&mut self, id: NodeId) -> Result<(), GraphError> {
        let idx = id.index();
        if !self.store.dirty[idx] {
            return Ok(());
        }
        let parents = self.store.parents[idx].clone();
        for &p in &parents {
            if self.store.dirty[p.index()] && self.kind_tag(p) == KindTag::Deterministic {
                self.refresh(p)?;
            }
        }

        match self.store.kinds[idx].clone() {
            NodeKind::Constant => {}
            NodeKind::Deterministic(function) => {
                let mut current = std::mem::take(&mut self.store.values[idx]);
                let result = {
                    let parent_values: Vec<&NodeValue> = parents.iter().map(|p| &self.store.values[p.index()]).collect();
                    function.update(&mut current, &parent_values, &self.store.touched[idx])
                };
                self.store.values[idx] = current;
                result?;
            }
            NodeKind::Stochastic(density) => {
                let ln_p = {
                    let parent_values: Vec<&NodeValue> = parents.iter().map(|p| &self.store.values[p.index()]).collect();
                    density.ln_probability(&self.store.values[idx], &parent_values)?
                };
                self.store.ln_probability[idx] = ln_p;
            }
        }
        self.store.dirty[idx] = false;
        Ok(())
    }

    // --- Probabilities ---

    pub fn ln_probability(&mut self, id: NodeId) -> Result<f64, GraphError> {
        self.check(id)?;
        if self.kind_tag(id) != KindTag::Stochastic {
            return Err(GraphError::NotStochastic { node: id, name: self.name(id).to_string() });
        }
        self.refresh(id)?;
        Ok(self.store.ln_probability[id.index()])
    }

    /// Sum of the ln-probabilities of the given nodes, skipping non-stochastic ones.
    pub fn ln_probability_of(&mut self, ids: &[NodeId]) -> Result<f64, GraphError> {
        let mut total = 0.0;
        for &id in ids {
            if self.kind_tag(id) == KindTag::Stochastic {
                total += self.ln_probability(id)?;
            }
        }
        Ok(total)
    }

    pub fn ln_posterior(&mut self) -> Result<f64, GraphError> {
        let all: Vec<NodeId> = (0..self.node_count()).map(NodeId::new).collect();
        self.ln_probability_of(&all)
    }

    // --- Restructuring ---

    /// Replaces `old` by `new` among `child`'s parents and recomputes the
    /// affected caches. Fails without changes if the rewiring would close a cycle.
    pub fn rewire_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> Result<(), GraphError> {
        self.check_all(&[child, old, new])?;
        let backup = (
            self.store.parents[child.index()].clone(),
            self.store.children[old.index()].clone(),
            self.store.children[new.index()].clone(),
        );
        if !self.store.replace_parent(child, old, new) {
            return Err(GraphError::NotAParent { child, parent: old });
        }
        if let Err(e) = topology::check_acyclic(&self.store) {
            self.store.parents[child.index()] = backup.0;
            self.store.children[old.index()] = backup.1;
            self.store.children[new.index()] = backup.2;
            return Err(e);
        }

        let mut affected = vec![child];
        affected.extend(self.find_unique_descendants(child));
        for node in affected {
            if self.kind_tag(node) != KindTag::Constant {
                self.store.dirty[node.index()] = true;
            }
        }
        self.keep(child)
    }

    // --- Checkpoints ---

    pub fn state(&self) -> GraphState {
        let nodes = (0..self.node_count())
            .map(|i| {
                let kind = self.store.kinds[i].tag();
                let dirty = self.store.dirty[i];
                NodeState {
                    name: self.store.names[i].clone(),
                    kind,
                    value: self.store.values[i].clone(),
                    dirty,
                    touched: self.store.touched[i].iter().copied().collect(),
                    ln_probability: (kind == KindTag::Stochastic && !dirty).then(|| self.store.ln_probability[i]),
                }
            })
            .collect();
        GraphState { nodes }
    }

    /// Loads constant and stochastic values from a checkpoint taken on a graph with
    /// the same structure, then recomputes every cache.
    pub fn apply_values(&mut self, state: &GraphState) -> Result<(), GraphError> {
        if state.nodes.len() != self.node_count() {
            return Err(GraphError::Checkpoint(format!(
                "checkpoint has {} nodes, graph has {}",
                state.nodes.len(),
                self.node_count()
            )));
        }
        for (i, node) in state.nodes.iter().enumerate() {
            let id = NodeId::new(i);
            if node.kind != self.kind_tag(id) {
                return Err(self.mismatch(id, &format!("{:?}", self.kind_tag(id)), &format!("{:?}", node.kind)));
            }
            if node.kind != KindTag::Deterministic {
                self.set_value(id, node.value.clone())?;
            }
        }
        for i in 0..self.node_count() {
            if self.store.kinds[i].tag() != KindTag::Constant {
                self.store.dirty[i] = true;
            }
            self.store.snapshots[i] = None;
            self.store.touched[i].clear();
        }
        for id in self.topological_order()? {
            self.refresh(id)?;
        }
        Ok(())
    }

    // --- Helpers ---

    fn check(&self, id: NodeId) -> Result<(), GraphError> {
        if self.store.contains(id) { Ok(()) } else { Err(GraphError::UnknownNode { node: id }) }
    }

    fn check_all(&self, ids: &[NodeId]) -> Result<(), GraphError> {
        ids.iter().try_for_each(|&id| self.check(id))
    }

    pub(crate) fn mismatch(&self, id: NodeId, expected: &str, found: &str) -> GraphError {
        GraphError::KindMismatch {
            node: id,
            name: self.name(id).to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::{Dirichlet, Exponential, ScaledVector, Total};

    /// rate ~ Exp(1); weights ~ Dirichlet(1,1,1); scaled = rate * weights; total = sum(scaled)
    struct Model {
        graph: ModelGraph,
        rate: NodeId,
        weights: NodeId,
        scaled: NodeId,
        total: NodeId,
        scaler: Arc<ScaledVector>,
    }

    fn model() -> Model {
        let mut graph = ModelGraph::new();
        let one = graph.add_constant("one", NodeValue::Real(1.0));
        let alpha = graph.add_constant("alpha", NodeValue::Vector(vec![2.0, 2.0, 2.0]));
        let rate = graph.add_stochastic("rate", Arc::new(Exponential), NodeValue::Real(2.0), &[one]).unwrap();
        let weights = graph
            .add_stochastic("weights", Arc::new(Dirichlet), NodeValue::Simplex(vec![0.2, 0.3, 0.5]), &[alpha])
            .unwrap();
        let scaler = ScaledVector::shared();
        let scaled = graph.add_deterministic("scaled", scaler.clone(), &[rate, weights]).unwrap();
        let total = graph.add_deterministic("total", Arc::new(Total), &[scaled]).unwrap();
        Model { graph, rate, weights, scaled, total, scaler }
    }

    #[test]
    fn test_deterministic_nodes_evaluate_on_creation() {
        let m = model();
        assert_eq!(m.graph.value(m.scaled), &NodeValue::Vector(vec![0.4, 0.6, 1.0]));
        assert!((m.graph.value(m.total).as_real().unwrap() - 2.0).abs() < 1e-12);
        assert!(!m.graph.is_dirty(m.scaled));
    }

    #[test]
    fn test_set_value_does_not_propagate() {
        let mut m = model();
        m.graph.set_value(m.rate, NodeValue::Real(3.0)).unwrap();
        assert!(!m.graph.is_dirty(m.scaled));
        assert_eq!(m.graph.value(m.scaled), &NodeValue::Vector(vec![0.4, 0.6, 1.0]));
    }

    #[test]
    fn test_set_value_rejects_shape_change() {
        let mut m = model();
        let err = m.graph.set_value(m.rate, NodeValue::Simplex(vec![0.5, 0.5])).unwrap_err();
        assert!(matches!(err, GraphError::KindMismatch { .. }));
        let err = m.graph.set_value(m.weights, NodeValue::Simplex(vec![0.5, 0.5])).unwrap_err();
        assert!(matches!(err, GraphError::KindMismatch { .. }));
        let err = m.graph.set_value(m.total, NodeValue::Real(1.0)).unwrap_err();
        assert!(matches!(err, GraphError::KindMismatch { .. }));
    }

    #[test]
    fn test_touch_and_keep_recompute_descendants() {
        let mut m = model();
        m.graph.set_value(m.rate, NodeValue::Real(3.0)).unwrap();
        m.graph.touch_with_descendants(m.rate);
        assert!(m.graph.is_dirty(m.scaled));
        assert!(m.graph.is_dirty(m.total));

        m.graph.keep(m.rate).unwrap();
        assert!(!m.graph.is_dirty(m.scaled));
        assert!((m.graph.value(m.total).as_real().unwrap() - 3.0).abs() < 1e-12);
        // Exp(1) at 3.0
        assert!((m.graph.ln_probability(m.rate).unwrap() + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_restore_is_observably_identical() {
        let mut m = model();
        // Make every cache valid before the round trip.
        m.graph.ln_posterior().unwrap();
        let before = m.graph.state();

        m.graph.set_value(m.rate, NodeValue::Real(5.0)).unwrap();
        m.graph.touch_with_descendants(m.rate);
        m.graph.add_touched_element_index(m.scaled, 1);
        // Force the recompute so the caches really differ before rolling back.
        m.graph.ln_posterior().unwrap();
        assert_ne!(m.graph.state(), before);

        m.graph.set_value(m.rate, NodeValue::Real(2.0)).unwrap();
        m.graph.restore(m.rate);
        assert_eq!(m.graph.state(), before);
    }

    #[test]
    fn test_restore_keeps_lazy_ln_probability_lazy() {
        let mut m = model();
        let before = m.graph.state();
        assert!(m.graph.is_dirty(m.rate));

        m.graph.touch(m.rate);
        m.graph.ln_probability(m.rate).unwrap();
        m.graph.restore(m.rate);
        assert!(m.graph.is_dirty(m.rate));
        assert_eq!(m.graph.state(), before);
    }

    #[test]
    fn test_keep_uses_touched_indices_incrementally() {
        let mut m = model();
        let full_before = m.scaler.full_evaluations();

        // Change one simplex entry (not a valid simplex, but enough to observe partial updates).
        m.graph.set_value(m.weights, NodeValue::Simplex(vec![0.2, 0.9, 0.5])).unwrap();
        m.graph.add_touched_element_index(m.scaled, 1);
        m.graph.touch_with_descendants(m.weights);
        m.graph.keep(m.weights).unwrap();

        assert_eq!(m.scaler.full_evaluations(), full_before);
        assert_eq!(m.graph.value(m.scaled), &NodeValue::Vector(vec![0.4, 1.8, 1.0]));
        assert!(m.graph.touched_element_indices(m.scaled).is_empty());
    }

    #[test]
    fn test_unique_descendants_excludes_start_and_constants() {
        let m = model();
        let desc = m.graph.find_unique_descendants(m.rate);
        assert_eq!(desc, vec![m.scaled, m.total]);
    }

    #[test]
    fn test_ln_probability_rejects_deterministic() {
        let mut m = model();
        assert!(matches!(m.graph.ln_probability(m.scaled), Err(GraphError::NotStochastic { .. })));
    }

    #[test]
    fn test_rewire_rejects_cycle_and_leaves_graph_unchanged() {
        let mut m = model();
        let before = m.graph.state();
        let err = m.graph.rewire_parent(m.scaled, m.rate, m.total).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert_eq!(m.graph.parents(m.scaled), &[m.rate, m.weights]);
        assert_eq!(m.graph.children(m.total), &[] as &[NodeId]);
        assert_eq!(m.graph.state(), before);
    }

    #[test]
    fn test_rewire_recomputes_child() {
        let mut m = model();
        let other = m.graph.add_constant("other", NodeValue::Real(10.0));
        m.graph.rewire_parent(m.scaled, m.rate, other).unwrap();
        assert_eq!(m.graph.value(m.scaled), &NodeValue::Vector(vec![2.0, 3.0, 5.0]));
        assert!((m.graph.value(m.total).as_real().unwrap() - 10.0).abs() < 1e-12);
        assert!(matches!(
            m.graph.rewire_parent(m.scaled, m.rate, other),
            Err(GraphError::NotAParent { .. })
        ));
    }

    #[test]
    fn test_checkpoint_round_trip_through_json() {
        let mut m = model();
        m.graph.set_value(m.rate, NodeValue::Real(4.0)).unwrap();
        m.graph.touch_with_descendants(m.rate);
        m.graph.keep(m.rate).unwrap();
        let json = m.graph.state().to_json().unwrap();

        let mut fresh = model();
        fresh.graph.apply_values(&GraphState::from_json(&json).unwrap()).unwrap();
        assert_eq!(fresh.graph.value(fresh.scaled), m.graph.value(m.scaled));
        assert_eq!(fresh.graph.ln_posterior().unwrap(), m.graph.ln_posterior().unwrap());
    }

    #[test]
    #[should_panic]
    fn test_touch_of_foreign_id_panics() {
        let mut m = model();
        let foreign = NodeId::new(m.graph.node_count() + 5);
        assert!(matches!(m.graph.keep(foreign), Err(GraphError::UnknownNode { .. })));
        m.graph.touch(foreign);
    }
}
