//! Graph of nodes and the topological compile step.
//!
//! A graph is a named list of nodes that starts from one or more entry ids
//! (`root`). Entry ids are either `initial`, in which case the synthetic
//! initial node is part of the graph, or the leaves of graphs built earlier.
//!
//! `build` validates that every parent resolves, sorts the nodes with
//! Kahn's algorithm (FIFO, insertion-order tie-breaks) and records the
//! leaves: ids that no node in this graph consumes.

use super::node::{INITIAL, Node, ParentRef, is_sentinel};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, error};

/// Outcome of Kahn's algorithm over a node list.
#[derive(Debug, Clone)]
pub(crate) struct TopoOrder {
    /// Indices into the input slice, dependencies first.
    pub order: Vec<usize>,
    pub sortable: bool,
}

/// Kahn's algorithm.
///
/// Parents listed in `external` (or unknown to `nodes`) do not count toward
/// a node's indegree. Ready nodes are served in the order they became ready,
/// and nodes that become ready together are queued in slice order.
pub(crate) fn kahn(nodes: &[&Node], external: &HashSet<&str>) -> TopoOrder {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let mut indegree = vec![0usize; nodes.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for parent in node.parents() {
            if external.contains(parent.as_str()) {
                continue;
            }
            if let Some(&p) = index.get(parent.as_str()) {
                indegree[i] += 1;
                children[p].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &child in &children[current] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    TopoOrder {
        sortable: order.len() == nodes.len(),
        order,
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    id: String,
    root: Vec<String>,
    nodes: Vec<Node>,
    leaves: Vec<String>,
    sorted: Vec<String>,
    attempted_built: bool,
    sortable: bool,
}

impl Graph {
    /// A graph fed by `initial`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root: vec![INITIAL.to_string()],
            nodes: vec![Node::initial()],
            leaves: Vec::new(),
            sorted: Vec::new(),
            attempted_built: false,
            sortable: false,
        }
    }

    /// A graph fed by the given ids or by the leaves of other graphs.
    pub fn with_root<R>(id: impl Into<String>, root: R) -> Result<Self>
    where
        R: IntoIterator,
        R::Item: Into<ParentRef>,
    {
        let id = id.into();
        let mut graph = Self {
            id,
            root: Vec::new(),
            nodes: Vec::new(),
            leaves: Vec::new(),
            sorted: Vec::new(),
            attempted_built: false,
            sortable: false,
        };

        for item in root {
            match item.into() {
                ParentRef::Id(r) if r == INITIAL => {
                    graph.root.push(r);
                    graph.nodes.push(Node::initial());
                }
                ParentRef::Id(r) if is_sentinel(&r) => {}
                ParentRef::Id(r) => graph.root.push(r),
                ParentRef::Leaves(leaves) => {
                    if leaves.is_empty() {
                        return Err(Error::Plan(format!(
                            "graph {} is rooted on a graph with no leaves",
                            graph.id
                        )));
                    }
                    graph.root.extend(leaves);
                }
            }
        }
        if graph.root.is_empty() {
            return Err(Error::Plan(format!("graph {} has no root", graph.id)));
        }
        Ok(graph)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &[String] {
        &self.root
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Leaves found by the last `build`; empty before.
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    /// Node ids in topological order, from the last successful `build`.
    pub fn sorted(&self) -> &[String] {
        &self.sorted
    }

    pub fn attempted_built(&self) -> bool {
        self.attempted_built
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Compile the graph.
    ///
    /// Every problem is logged before the first one is returned: duplicate
    /// ids, parents that are neither nodes nor entry ids, and cycles.
    pub fn build(&mut self) -> Result<()> {
        if self.attempted_built {
            error!("graph {} has already been built", self.id);
        }
        self.attempted_built = true;
        self.sorted.clear();

        let mut problems: Vec<Error> = Vec::new();

        // 1) Unique ids.
        let mut ids: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id()) {
                problems.push(Error::Plan(format!(
                    "duplicate node id {} in graph {}",
                    node.id(),
                    self.id
                )));
            }
        }

        // 2) Leaves: ids minus everything used as a parent.
        let have_children: BTreeSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.parents().iter().map(String::as_str))
            .filter(|p| !is_sentinel(p))
            .collect();
        self.leaves = self
            .nodes
            .iter()
            .map(Node::id)
            .filter(|id| !have_children.contains(id))
            .map(str::to_string)
            .collect();

        // 3) Every parent must be a node here or an entry id.
        let external: HashSet<&str> = self.root.iter().map(String::as_str).collect();
        for node in &self.nodes {
            for parent in node.parents() {
                if !ids.contains(parent.as_str()) && !external.contains(parent.as_str()) {
                    problems.push(Error::Plan(format!(
                        "cannot retrieve inputs of {}: parent {} is not in graph {}",
                        node.id(),
                        parent,
                        self.id
                    )));
                }
            }
        }

        // 4) Kahn's sort.
        let refs: Vec<&Node> = self.nodes.iter().collect();
        let topo = kahn(&refs, &external);
        self.sortable = topo.sortable;
        if !topo.sortable {
            problems.push(Error::NotSortable {
                graph: self.id.clone(),
                visited: topo.order.len(),
                total: self.nodes.len(),
            });
        }

        for problem in &problems {
            error!("{}", problem);
        }
        if let Some(first) = problems.into_iter().next() {
            return Err(first);
        }

        self.sorted = topo
            .order
            .iter()
            .map(|&i| self.nodes[i].id().to_string())
            .collect();
        debug!(graph = %self.id, order = ?self.sorted, leaves = ?self.leaves, "graph built");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diamond() -> Graph {
        let mut g = Graph::new("diamond");
        g.add(Node::new(["initial"], ["alg1", "alg2"], "seq1").unwrap());
        g.add(Node::new(["initial"], ["alg1", "alg2"], "seq2").unwrap());
        g.add(Node::new(["seq1", "seq2"], ["alg3"], "seq3").unwrap());
        g.add(Node::new(["seq3"], ["alg4"], "seq4").unwrap());
        g
    }

    #[test]
    fn diamond_sorts_with_insertion_tie_break() {
        let mut g = diamond();
        g.build().unwrap();
        assert_eq!(g.sorted(), ["initial", "seq1", "seq2", "seq3", "seq4"]);
        assert_eq!(g.leaves(), ["seq4"]);
    }

    #[test]
    fn insertion_order_decides_ties() {
        let mut g = Graph::new("swapped");
        g.add(Node::new(["initial"], ["a"], "seq2").unwrap());
        g.add(Node::new(["initial"], ["a"], "seq1").unwrap());
        g.build().unwrap();
        assert_eq!(g.sorted(), ["initial", "seq2", "seq1"]);
    }

    #[test]
    fn leaves_are_ids_minus_parents() {
        let mut g = Graph::new("fan");
        g.add(Node::new(["initial"], ["a"], "x").unwrap());
        g.add(Node::new(["x"], ["a"], "y").unwrap());
        g.add(Node::new(["x"], ["a"], "z").unwrap());
        g.build().unwrap();

        let ids: BTreeSet<&str> = g.nodes().iter().map(Node::id).collect();
        let parents: BTreeSet<&str> = g
            .nodes()
            .iter()
            .flat_map(|n| n.parents().iter().map(String::as_str))
            .collect();
        let want: BTreeSet<&str> = ids.difference(&parents).copied().collect();
        let got: BTreeSet<&str> = g.leaves().iter().map(String::as_str).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn cycle_is_not_sortable_and_terminates() {
        let mut g = Graph::new("cycle");
        g.add(Node::new(["initial", "c"], ["a"], "a").unwrap());
        g.add(Node::new(["a"], ["a"], "b").unwrap());
        g.add(Node::new(["b"], ["a"], "c").unwrap());
        let err = g.build().unwrap_err();
        assert!(matches!(err, Error::NotSortable { visited: 1, total: 4, .. }));
        assert!(!g.is_sortable());
        assert!(g.attempted_built());
    }

    #[test]
    fn unknown_parent_fails() {
        let mut g = Graph::new("typo");
        g.add(Node::new(["initial"], ["a"], "a").unwrap());
        g.add(Node::new(["aa"], ["a"], "b").unwrap());
        assert!(matches!(g.build(), Err(Error::Plan(_))));
    }

    #[test]
    fn composes_on_leaves_of_other_graphs() {
        let mut first = diamond();
        first.build().unwrap();

        let mut second = Graph::with_root("second", [&first]).unwrap();
        second.add(Node::new([&first], ["merge"], "out").unwrap());
        second.build().unwrap();

        assert_eq!(second.root(), ["seq4"]);
        assert_eq!(second.nodes()[0].parents(), ["seq4"]);
        assert_eq!(second.leaves(), ["out"]);
    }
}
