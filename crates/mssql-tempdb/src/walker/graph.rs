//! Object dependency graph.
//!
//! Nodes are catalog objects keyed by URN, in discovery order. An edge
//! `before -> after` means `before` must be applied first.

use std::collections::{BTreeSet, HashMap};

use crate::catalog::ObjectRef;

/// Index of a node in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Directed graph of objects to apply.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<ObjectRef>,
    index: HashMap<String, NodeId>,
    /// For each node, nodes that must come before it
    before: Vec<Vec<NodeId>>,
    /// For each node, nodes that must come after it
    after: Vec<Vec<NodeId>>,
}

/// Result of ordering the graph.
#[derive(Debug)]
pub struct TopoSortResult {
    /// All nodes, each after everything it must follow (cycles broken).
    pub order: Vec<NodeId>,
    /// Nodes that were part of a cycle.
    pub cyclic: Vec<NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its id. Adding a known URN returns the
    /// existing id.
    pub fn add_node(&mut self, object: ObjectRef) -> (NodeId, bool) {
        let urn = object.urn();
        if let Some(&id) = self.index.get(&urn) {
            return (id, false);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(object);
        self.index.insert(urn, id);
        self.before.push(Vec::new());
        self.after.push(Vec::new());
        (id, true)
    }

    /// Require `first` to be applied before `then`. Self edges are ignored.
    pub fn add_edge(&mut self, first: NodeId, then: NodeId) {
        if first == then {
            return;
        }
        if !self.before[then.0].contains(&first) {
            self.before[then.0].push(first);
            self.after[first.0].push(then);
        }
    }

    pub fn node(&self, id: NodeId) -> &ObjectRef {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Perform topological sort using Kahn's algorithm.
    ///
    /// Among nodes that are ready at the same time the earliest discovered
    /// wins. When only cyclic nodes remain, the one with the fewest unmet
    /// predecessors (then earliest discovered) is released so every node is
    /// emitted exactly once.
    pub fn topo_sort(&self) -> TopoSortResult {
        let n = self.len();
        let mut in_degree: Vec<usize> = self.before.iter().map(Vec::len).collect();
        let mut emitted = vec![false; n];

        let mut ready: BTreeSet<NodeId> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(NodeId)
            .collect();

        let mut order = Vec::with_capacity(n);
        let mut cyclic = Vec::new();

        while order.len() < n {
            let next = match ready.pop_first() {
                Some(id) => id,
                None => {
                    // Everything left waits on something else left: a cycle
                    let candidate = (0..n)
                        .filter(|&i| !emitted[i] && self.on_cycle(NodeId(i), &emitted))
                        .min_by_key(|&i| (in_degree[i], i))
                        .or_else(|| {
                            (0..n)
                                .filter(|&i| !emitted[i])
                                .min_by_key(|&i| (in_degree[i], i))
                        });
                    let Some(i) = candidate else {
                        break;
                    };
                    cyclic.push(NodeId(i));
                    NodeId(i)
                }
            };

            emitted[next.0] = true;
            order.push(next);

            for &child in &self.after[next.0] {
                if emitted[child.0] {
                    continue;
                }
                in_degree[child.0] -= 1;
                if in_degree[child.0] == 0 {
                    ready.insert(child);
                }
            }
        }

        TopoSortResult { order, cyclic }
    }

    /// Whether `start` can reach itself through nodes not yet emitted.
    fn on_cycle(&self, start: NodeId, emitted: &[bool]) -> bool {
        let mut visited = vec![false; self.len()];
        let mut stack: Vec<NodeId> = self.after[start.0].clone();

        while let Some(current) = stack.pop() {
            if current == start {
                return true;
            }
            if emitted[current.0] || visited[current.0] {
                continue;
            }
            visited[current.0] = true;
            stack.extend(self.after[current.0].iter().copied());
        }

        false
    }
}
