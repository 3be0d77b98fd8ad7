use super::types::*;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashSet};

pub type EdgeList = SmallVec<[NodeId; 4]>;

/// Columnar arena holding every node of a model graph.
///
/// Nodes are addressed by `NodeId` and never removed, so ids stay valid for the
/// lifetime of the registry. Edges are stored in both directions.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    // Columnar Arrays
    pub kinds: Vec<NodeKind>,
    pub names: Vec<String>,
    pub values: Vec<NodeValue>,

    // Topology
    pub parents: Vec<EdgeList>,
    pub children: Vec<EdgeList>,

    // Cache bookkeeping
    pub dirty: Vec<bool>,
    pub touched: Vec<BTreeSet<usize>>,
    pub ln_probability: Vec<f64>,
    pub snapshots: Vec<Option<Snapshot>>,

    used_names: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.kinds.len() }

    pub fn contains(&self, id: NodeId) -> bool { id.index() < self.count() }

    pub fn add_node(&mut self, kind: NodeKind, value: NodeValue, parents: &[NodeId], name: &str) -> NodeId {
        let id = NodeId(self.kinds.len() as u32);

        // --- Unique Name Enforcement ---
        let mut candidate_name = name.to_string();
        let mut counter = 1;
        while self.used_names.contains(&candidate_name) {
            candidate_name = format!("{}_{}", name, counter);
            counter += 1;
        }
        self.used_names.insert(candidate_name.clone());

        // 1. Register Parents (a parent listed twice still gets a single child edge)
        self.parents.push(parents.iter().copied().collect());
        for &parent in parents {
            let siblings = &mut self.children[parent.index()];
            if !siblings.contains(&id) {
                siblings.push(id);
            }
        }

        // 2. Columns
        // Stochastic nodes start dirty: their ln-probability is computed on first demand.
        let dirty = matches!(kind, NodeKind::Stochastic(_));
        self.kinds.push(kind);
        self.names.push(candidate_name);
        self.values.push(value);
        self.children.push(EdgeList::new());
        self.dirty.push(dirty);
        self.touched.push(BTreeSet::new());
        self.ln_probability.push(0.0);
        self.snapshots.push(None);

        id
    }

    #[inline(always)]
    pub fn get_parents(&self, id: NodeId) -> &[NodeId] {
        &self.parents[id.index()]
    }

    #[inline(always)]
    pub fn get_children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.index()]
    }

    /// Re-points every `old -> child` edge to `new -> child`. Returns `false` when
    /// `old` is not a parent of `child`.
    pub fn replace_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> bool {
        let parents = &mut self.parents[child.index()];
        if !parents.contains(&old) {
            return false;
        }
        for p in parents.iter_mut() {
            if *p == old {
                *p = new;
            }
        }
        self.children[old.index()].retain(|c| *c != child);
        let new_children = &mut self.children[new.index()];
        if !new_children.contains(&child) {
            new_children.push(child);
        }
        true
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.iter().position(|n| n == name).map(NodeId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let mut reg = Registry::new();
        reg.add_node(NodeKind::Constant, NodeValue::Real(1.0), &[], "rate");
        let b = reg.add_node(NodeKind::Constant, NodeValue::Real(2.0), &[], "rate");
        let c = reg.add_node(NodeKind::Constant, NodeValue::Real(3.0), &[], "rate");
        assert_eq!(reg.names[b.index()], "rate_1");
        assert_eq!(reg.names[c.index()], "rate_2");
        assert_eq!(reg.find_by_name("rate_2"), Some(c));
    }

    #[test]
    fn test_repeated_parent_has_one_child_edge() {
        let mut reg = Registry::new();
        let a = reg.add_node(NodeKind::Constant, NodeValue::Real(1.0), &[], "a");
        let b = reg.add_node(NodeKind::Constant, NodeValue::Real(1.0), &[a, a], "b");
        assert_eq!(reg.get_parents(b), &[a, a]);
        assert_eq!(reg.get_children(a), &[b]);
    }

    #[test]
    fn test_replace_parent_moves_edges() {
        let mut reg = Registry::new();
        let a = reg.add_node(NodeKind::Constant, NodeValue::Real(1.0), &[], "a");
        let b = reg.add_node(NodeKind::Constant, NodeValue::Real(2.0), &[], "b");
        let c = reg.add_node(NodeKind::Constant, NodeValue::Real(0.0), &[a], "c");

        assert!(reg.replace_parent(c, a, b));
        assert_eq!(reg.get_parents(c), &[b]);
        assert!(reg.get_children(a).is_empty());
        assert_eq!(reg.get_children(b), &[c]);
        assert!(!reg.replace_parent(c, a, b));
    }
}
