//! Plan layer: nodes, graphs and the menu compiler.
//!
//! This module knows nothing about payloads or algorithms beyond their
//! names. It owns:
//! - Node / Graph (graph-local topological compile)
//! - Menu (union of graphs into one execution plan rooted at `initial`)
//! - the JSON wire form of a compiled plan

pub mod graph;
pub mod msg;
pub mod node;

pub use graph::Graph;
pub use msg::{GraphMsg, MenuMsg, NodeMsg};
pub use node::{INITIAL, IOREQUEST, Node, ParentRef};

use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, info};
use uuid::Uuid;

/// One compiled plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub id: String,
    pub algos: Vec<String>,
    pub parents: Vec<String>,
}

/// Insertion-ordered `id -> (algos, parents)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSequence {
    entries: Vec<PlanNode>,
    index: HashMap<String, usize>,
}

impl OrderedSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. A repeated id replaces the earlier value in place.
    pub fn insert(&mut self, id: impl Into<String>, algos: Vec<String>, parents: Vec<String>) {
        let id = id.into();
        if let Some(&i) = self.index.get(&id) {
            self.entries[i].algos = algos;
            self.entries[i].parents = parents;
            return;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(PlanNode { id, algos, parents });
    }

    pub fn get(&self, id: &str) -> Option<&PlanNode> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanNode> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids that no entry consumes.
    pub fn leaves(&self) -> Vec<String> {
        let parents: HashSet<&str> = self
            .entries
            .iter()
            .flat_map(|e| e.parents.iter().map(String::as_str))
            .collect();
        self.entries
            .iter()
            .filter(|e| !parents.contains(e.id.as_str()))
            .map(|e| e.id.clone())
            .collect()
    }
}

impl<'a> IntoIterator for &'a OrderedSequence {
    type Item = &'a PlanNode;
    type IntoIter = std::slice::Iter<'a, PlanNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A set of graphs compiled into one plan.
#[derive(Debug, Clone)]
pub struct Menu {
    name: String,
    uuid: String,
    graphs: Vec<Graph>,
    sequence: OrderedSequence,
    root: Option<String>,
    attempted_built: bool,
    from_msg: bool,
}

impl Menu {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4().to_string(),
            graphs: Vec::new(),
            sequence: OrderedSequence::new(),
            root: None,
            attempted_built: false,
            from_msg: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    pub fn ordered_sequence(&self) -> &OrderedSequence {
        &self.sequence
    }

    /// `Some("initial")` once a build found exactly that single root.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn is_from_msg(&self) -> bool {
        self.from_msg
    }

    /// Accept a graph whose `build` has been attempted.
    pub fn add(&mut self, graph: Graph) -> Result<()> {
        if !graph.attempted_built() {
            error!("menu {}: graph {} was never built", self.name, graph.id());
            return Err(Error::Plan(format!(
                "graph {} must be built before it is added to menu {}",
                graph.id(),
                self.name
            )));
        }
        self.graphs.push(graph);
        Ok(())
    }

    /// Compile all graphs into the ordered sequence.
    ///
    /// The sequence is emitted even when the root check fails so it can be
    /// inspected; the error is still returned and the job must not start.
    pub fn build(&mut self) -> Result<()> {
        if self.from_msg {
            error!("menu {} was read from a message and cannot be rebuilt", self.name);
            return Err(Error::Config(format!(
                "menu {} was read from a message and cannot be rebuilt",
                self.name
            )));
        }
        self.attempted_built = true;
        self.sequence = OrderedSequence::new();
        self.root = None;

        let initial = Node::initial();

        // 1) Union of all graphs; first occurrence of an id wins.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut nodes: Vec<&Node> = Vec::new();
        for graph in &self.graphs {
            for node in graph.nodes() {
                if seen.insert(node.id()) {
                    nodes.push(node);
                }
            }
        }

        // Graphs rooted only on other graphs' leaves never carry the
        // synthetic node themselves.
        let references_initial = nodes
            .iter()
            .any(|n| n.parents().iter().any(|p| p == INITIAL));
        if references_initial && !seen.contains(INITIAL) {
            nodes.insert(0, &initial);
        }

        let mut problems: Vec<Error> = Vec::new();

        // 2) Every parent must be some node.
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id()).collect();
        let mut unresolved: Vec<&str> = Vec::new();
        for node in &nodes {
            for parent in node.parents() {
                if !ids.contains(parent.as_str()) {
                    problems.push(Error::Plan(format!(
                        "node {} references unknown parent {}",
                        node.id(),
                        parent
                    )));
                    if !unresolved.contains(&parent.as_str()) {
                        unresolved.push(parent.as_str());
                    }
                }
            }
        }

        // 3) Kahn over the union.
        let topo = graph::kahn(&nodes, &HashSet::new());
        if !topo.sortable {
            problems.push(Error::NotSortable {
                graph: self.name.clone(),
                visited: topo.order.len(),
                total: nodes.len(),
            });
        }

        // 4) Exactly one root, named initial. Unresolved parents count as
        // roots of their own.
        let roots: Vec<&str> = nodes
            .iter()
            .filter(|n| n.parents().is_empty())
            .map(|n| n.id())
            .chain(unresolved.iter().copied())
            .collect();
        if roots.len() != 1 {
            problems.push(Error::Config(format!(
                "menu {} must have exactly one root, found {:?}",
                self.name, roots
            )));
        } else if roots[0] != INITIAL {
            problems.push(Error::Config(format!(
                "menu {} root is {}, expected {}",
                self.name, roots[0], INITIAL
            )));
        } else {
            self.root = Some(INITIAL.to_string());
        }

        // 5) Emit in sorted order.
        for &i in &topo.order {
            let node = nodes[i];
            if node.id() == INITIAL {
                self.sequence
                    .insert(INITIAL, vec![IOREQUEST.to_string()], Vec::new());
            } else {
                self.sequence
                    .insert(node.id(), node.algos().to_vec(), node.parents().to_vec());
            }
        }
        debug!(menu = %self.name, sequence = ?self.sequence.keys().collect::<Vec<_>>(), "menu built");

        for problem in &problems {
            error!("{}", problem);
        }
        match problems.into_iter().next() {
            Some(first) => Err(first),
            None => {
                info!(
                    "menu {} built: {} nodes, leaves {:?}",
                    self.name,
                    self.sequence.len(),
                    self.sequence.leaves()
                );
                Ok(())
            }
        }
    }

    /// Leaves of the compiled plan.
    pub fn leaves(&self) -> Result<Vec<String>> {
        if !self.attempted_built && !self.from_msg {
            return Err(Error::Plan(format!(
                "cannot get leaves from unbuilt menu {}",
                self.name
            )));
        }
        Ok(self.sequence.leaves())
    }

    /// `id -> algorithm names`, in execution order.
    pub fn to_graph(&self) -> Vec<(String, Vec<String>)> {
        self.sequence
            .iter()
            .map(|e| (e.id.clone(), e.algos.clone()))
            .collect()
    }

    /// `id -> parents`.
    pub fn to_tree(&self) -> BTreeMap<String, Vec<String>> {
        self.sequence
            .iter()
            .map(|e| (e.id.clone(), e.parents.clone()))
            .collect()
    }

    /// Flat wire form; node order is the execution order.
    pub fn to_msg(&self) -> MenuMsg {
        MenuMsg {
            name: self.name.clone(),
            uuid: self.uuid.clone(),
            graphs: vec![GraphMsg {
                name: self.name.clone(),
                nodes: self
                    .sequence
                    .iter()
                    .map(|e| NodeMsg {
                        name: e.id.clone(),
                        parents: e.parents.clone(),
                        algos: e.algos.clone(),
                    })
                    .collect(),
            }],
        }
    }

    /// Rebuild a compiled menu. Wire order is taken as is.
    pub fn from_msg(msg: &MenuMsg) -> Result<Self> {
        let mut menu = Menu::new(msg.name.clone());
        if !msg.uuid.is_empty() {
            menu.uuid = msg.uuid.clone();
        }
        menu.from_msg = true;

        for graph in &msg.graphs {
            for node in &graph.nodes {
                if menu.sequence.contains(&node.name) {
                    return Err(Error::Plan(format!(
                        "duplicate node {} in menu message {}",
                        node.name, msg.name
                    )));
                }
                menu.sequence
                    .insert(node.name.clone(), node.algos.clone(), node.parents.clone());
            }
        }
        if menu.sequence.contains(INITIAL) {
            menu.root = Some(INITIAL.to_string());
        }
        Ok(menu)
    }

    /// Compile a definition written in the wire shape, one graph per
    /// `graphs` entry. Parents that a graph does not define become its
    /// entry ids.
    pub fn from_definition(msg: &MenuMsg) -> Result<Self> {
        let mut menu = Menu::new(msg.name.clone());
        if !msg.uuid.is_empty() {
            menu.uuid = msg.uuid.clone();
        }

        for (i, gmsg) in msg.graphs.iter().enumerate() {
            let gname = if gmsg.name.is_empty() {
                format!("{}_{}", msg.name, i)
            } else {
                gmsg.name.clone()
            };

            let defined: HashSet<&str> = gmsg.nodes.iter().map(|n| n.name.as_str()).collect();
            let mut root: Vec<String> = Vec::new();
            for n in &gmsg.nodes {
                for p in &n.parents {
                    if !defined.contains(p.as_str()) && !root.contains(p) {
                        root.push(p.clone());
                    }
                }
            }

            let mut graph = Graph::with_root(gname, root)?;
            for n in &gmsg.nodes {
                if n.name == INITIAL {
                    continue;
                }
                graph.add(Node::new(n.parents.clone(), n.algos.clone(), n.name.clone())?);
            }
            graph.build()?;
            menu.add(graph)?;
        }

        menu.build()?;
        Ok(menu)
    }
}
