use crate::graph::GraphError;
use crate::store::{KindTag, NodeId, Registry};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

/// Performs a Topological Sort using Depth-First Search (DFS).
///
/// Returns a list of NodeIds where every parent appears before its dependents.
pub fn sort(registry: &Registry) -> Result<Vec<NodeId>, GraphError> {
    let count = registry.count();
    let mut order = Vec::with_capacity(count);
    let mut state = vec![VisitState::None; count];

    // Iterate 0..count so disconnected nodes are visited too.
    for i in 0..count {
        if state[i] == VisitState::None {
            visit(NodeId::new(i), registry, &mut state, &mut order)?;
        }
    }

    Ok(order)
}

#[derive(Clone, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting, // Used for cycle detection
    Visited,
}

fn visit(
    node: NodeId,
    registry: &Registry,
    state: &mut Vec<VisitState>,
    order: &mut Vec<NodeId>,
) -> Result<(), GraphError> {
    let idx = node.index();

    match state[idx] {
        VisitState::Visited => return Ok(()),
        VisitState::Visiting => return Err(GraphError::CycleDetected { node }),
        VisitState::None => state[idx] = VisitState::Visiting,
    }

    for &parent in registry.get_parents(node) {
        visit(parent, registry, state, order)?;
    }

    state[idx] = VisitState::Visited;
    order.push(node);
    Ok(())
}

/// Collects every stochastic or deterministic node reachable from `start` through
/// child edges. `start` itself is excluded and each node appears exactly once, no
/// matter how many paths lead to it.
///
/// The result is in topological order: a reversed DFS post-order over children.
pub fn unique_descendants(registry: &Registry, start: NodeId) -> Vec<NodeId> {
    let mut seen = vec![false; registry.count()];
    let mut post_order = Vec::new();
    // Explicit stack of (node, next child position) to avoid deep recursion on long chains.
    let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
    seen[start.index()] = true;

    while let Some((node, pos)) = stack.pop() {
        let children = registry.get_children(node);
        if pos < children.len() {
            stack.push((node, pos + 1));
            let child = children[pos];
            if !seen[child.index()] {
                seen[child.index()] = true;
                stack.push((child, 0));
            }
        } else if node != start {
            post_order.push(node);
        }
    }

    post_order.reverse();
    post_order.retain(|id| registry.kinds[id.index()].tag() != KindTag::Constant);
    post_order
}

/// Independent acyclicity check over the full edge set, used after restructuring.
pub fn check_acyclic(registry: &Registry) -> Result<(), GraphError> {
    let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::with_capacity(registry.count(), registry.count());
    for i in 0..registry.count() {
        let id = NodeId::new(i);
        graph.add_node(id);
        for &parent in registry.get_parents(id) {
            graph.add_edge(parent, id, ());
        }
    }
    toposort(&graph, None)
        .map(|_| ())
        .map_err(|cycle| GraphError::CycleDetected { node: cycle.node_id() })
}
