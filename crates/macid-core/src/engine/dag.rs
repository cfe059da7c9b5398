//! Named-node directed acyclic graph.
//!
//! Thin wrapper over a `petgraph` stable graph that keys nodes by name,
//! rejects edges that would close a cycle, keeps parents in edge-insertion
//! order and provides the d-connection ("active trail") test used for
//! strategic relevance and sufficient recall.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::errors::ExecError;

#[derive(Debug, Clone, Default)]
pub struct Dag {
    /// Edge weights are insertion sequence numbers; edge indices are reused
    /// after removal and cannot order edges.
    graph: StableDiGraph<String, u64>,
    index: FxHashMap<String, NodeIndex>,
    order: Vec<String>,
    next_edge: u64,
}

/// Direction a Bayes-ball visit arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Pass {
    /// Arrived from a child, travelling towards parents.
    Up,
    /// Arrived from a parent, travelling towards children.
    Down,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a DAG from an edge list; endpoints are created on first use.
    pub fn from_edges<I, A, B>(edges: I) -> Result<Self, ExecError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut dag = Dag::new();
        for (src, dst) in edges {
            dag.ensure_node(src.as_ref());
            dag.ensure_node(dst.as_ref());
            dag.add_edge(src.as_ref(), dst.as_ref())?;
        }
        Ok(dag)
    }

    /// Adds a node, failing if the name is already taken.
    pub fn add_node(&mut self, name: &str) -> Result<(), ExecError> {
        if self.index.contains_key(name) {
            return Err(ExecError::structure(format!(
                "duplicate node definition '{}'",
                name
            )));
        }
        self.ensure_node(name);
        Ok(())
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.order.push(name.to_string());
        idx
    }

    /// Adds `src -> dst`. Both nodes must exist. Re-adding an existing edge is a
    /// no-op; an edge that would close a cycle is rejected.
    pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<(), ExecError> {
        let s = self.node_index(src)?;
        let d = self.node_index(dst)?;
        if self.graph.find_edge(s, d).is_some() {
            return Ok(());
        }
        if s == d || has_path_connecting(&self.graph, d, s, None) {
            return Err(ExecError::structure(format!(
                "edge {} -> {} would create a cycle",
                src, dst
            )));
        }
        self.graph.add_edge(s, d, self.next_edge);
        self.next_edge += 1;
        Ok(())
    }

    /// Removes `src -> dst`, returning whether it existed.
    pub fn remove_edge(&mut self, src: &str, dst: &str) -> bool {
        let (Some(&s), Some(&d)) = (self.index.get(src), self.index.get(dst)) else {
            return false;
        };
        match self.graph.find_edge(s, d) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| (*e.weight(), e.source(), e.target()))
            .collect();
        edges.sort_unstable_by_key(|(seq, _, _)| *seq);
        edges
            .into_iter()
            .map(|(_, s, d)| (self.graph[s].as_str(), self.graph[d].as_str()))
            .collect()
    }

    /// Parents of `name` in edge-insertion order, `None` for an unknown node.
    pub fn parents(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Children of `name` in edge-insertion order, `None` for an unknown node.
    pub fn children(&self, name: &str) -> Option<Vec<String>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<Vec<String>> {
        let idx = *self.index.get(name)?;
        let mut adjacent: Vec<_> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                (*e.weight(), other)
            })
            .collect();
        adjacent.sort_unstable_by_key(|(seq, _)| *seq);
        Some(
            adjacent
                .into_iter()
                .map(|(_, n)| self.graph[n].clone())
                .collect(),
        )
    }

    /// All node names in a topological order.
    pub fn topological_order(&self) -> Result<Vec<String>, ExecError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|i| self.graph[i].clone()).collect())
            .map_err(|cycle| {
                ExecError::Internal(format!(
                    "graph contains a cycle through '{}'",
                    self.graph[cycle.node_id()]
                ))
            })
    }

    /// The given nodes together with all of their ancestors.
    pub fn ancestors<'a, I>(&self, nodes: I) -> Result<FxHashSet<String>, ExecError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = FxHashSet::default();
        let mut stack = Vec::new();
        for name in nodes {
            stack.push(self.node_index(name)?);
        }
        while let Some(idx) = stack.pop() {
            if !seen.insert(self.graph[idx].clone()) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
        }
        Ok(seen)
    }

    /// Whether `ancestor` is an ancestor of (or equal to) `node`.
    pub fn is_ancestor(&self, ancestor: &str, node: &str) -> Result<bool, ExecError> {
        let a = self.node_index(ancestor)?;
        let n = self.node_index(node)?;
        Ok(has_path_connecting(&self.graph, a, n, None))
    }

    /// Whether there is an active (d-connecting) trail between `start` and
    /// `end` given the `observed` nodes.
    ///
    /// Uses the reachability ("Bayes-ball") traversal: a trail stays active
    /// through an unobserved chain or fork node, and through a collider only
    /// when the collider or one of its descendants is observed. Observed
    /// endpoints are never reachable.
    pub fn is_active_trail(
        &self,
        start: &str,
        end: &str,
        observed: &[&str],
    ) -> Result<bool, ExecError> {
        let start_idx = self.node_index(start)?;
        let end_idx = self.node_index(end)?;
        let mut observed_set = FxHashSet::default();
        for name in observed {
            observed_set.insert(self.node_index(name)?);
        }
        if observed_set.contains(&start_idx) || observed_set.contains(&end_idx) {
            return Ok(false);
        }

        // Observed nodes and their ancestors activate colliders.
        let mut activating = FxHashSet::default();
        let mut stack: Vec<NodeIndex> = observed_set.iter().copied().collect();
        while let Some(idx) = stack.pop() {
            if activating.insert(idx) {
                stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
            }
        }

        let mut visited: FxHashSet<(NodeIndex, Pass)> = FxHashSet::default();
        let mut frontier = vec![(start_idx, Pass::Up)];
        while let Some((node, pass)) = frontier.pop() {
            if !visited.insert((node, pass)) {
                continue;
            }
            let is_observed = observed_set.contains(&node);
            if !is_observed && node == end_idx {
                return Ok(true);
            }
            match pass {
                Pass::Up if !is_observed => {
                    for parent in self.graph.neighbors_directed(node, Direction::Incoming) {
                        frontier.push((parent, Pass::Up));
                    }
                    for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                        frontier.push((child, Pass::Down));
                    }
                }
                Pass::Up => {}
                Pass::Down => {
                    if !is_observed {
                        for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                            frontier.push((child, Pass::Down));
                        }
                    }
                    if activating.contains(&node) {
                        for parent in self.graph.neighbors_directed(node, Direction::Incoming) {
                            frontier.push((parent, Pass::Up));
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    fn node_index(&self, name: &str) -> Result<NodeIndex, ExecError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ExecError::structure(format!("unknown node '{}'", name)))
    }
}
