//! Execution tree: the mutable mirror of a compiled menu.
//!
//! Each `TreeNode` keeps one `Element` per processed chunk. Elements are
//! appended by steering and dropped together on `flush`, which also returns
//! their memory reservations to the pool.

use super::pool::{MemoryPool, Reservation};
use crate::error::{Error, Result};
use crate::menu::{INITIAL, OrderedSequence};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// Opaque payload carried by an element.
#[derive(Debug, Clone)]
pub enum Datum {
    /// Raw input bytes (one block of a file).
    Raw(Bytes),
    /// Columnar data produced by an algorithm.
    Batch(RecordBatch),
}

impl Datum {
    pub fn as_batch(&self) -> Option<&RecordBatch> {
        match self {
            Datum::Batch(b) => Some(b),
            Datum::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Datum::Raw(b) => Some(b),
            Datum::Batch(_) => None,
        }
    }

    /// Bytes held by columnar buffers. Raw input is not counted.
    pub fn columnar_size(&self) -> usize {
        match self {
            Datum::Batch(b) => b.get_array_memory_size(),
            Datum::Raw(_) => 0,
        }
    }
}

impl From<Bytes> for Datum {
    fn from(b: Bytes) -> Self {
        Datum::Raw(b)
    }
}

impl From<RecordBatch> for Datum {
    fn from(b: RecordBatch) -> Self {
        Datum::Batch(b)
    }
}

/// Per-node, per-chunk payload container.
///
/// Steering attaches the data of the node's parents in declared order. An
/// algorithm that produces output calls `set_data`, which replaces whatever
/// the element held and reserves the columnar size of the new datum.
#[derive(Debug)]
pub struct Element {
    key: String,
    data: Vec<Datum>,
    pool: MemoryPool,
    reservation: Option<Reservation>,
}

impl Element {
    pub fn new(key: impl Into<String>, pool: MemoryPool) -> Self {
        Self {
            key: key.into(),
            data: Vec::new(),
            pool,
            reservation: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &[Datum] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Add a shared reference to upstream data. Nothing is reserved: the
    /// producing element already accounts for it.
    pub fn attach(&mut self, datum: Datum) {
        self.data.push(datum);
    }

    /// Replace the element's data with an algorithm's output.
    pub fn set_data(&mut self, datum: impl Into<Datum>) {
        let datum = datum.into();
        let size = datum.columnar_size();
        self.reservation = if size > 0 {
            Some(self.pool.reserve(size))
        } else {
            None
        };
        self.data.clear();
        self.data.push(datum);
    }

    /// The element's record batch, when it holds exactly one.
    pub fn batch(&self) -> Option<&RecordBatch> {
        match self.data.as_slice() {
            [Datum::Batch(b)] => Some(b),
            _ => None,
        }
    }

    /// Every record batch attached to the element, in order.
    pub fn batches(&self) -> impl Iterator<Item = &RecordBatch> {
        self.data.iter().filter_map(Datum::as_batch)
    }

    /// Bytes this element has reserved in the pool.
    pub fn reserved(&self) -> usize {
        self.reservation.as_ref().map_or(0, Reservation::size)
    }
}

#[derive(Debug)]
pub struct TreeNode {
    key: String,
    parents: Vec<String>,
    children: Vec<String>,
    payload: Vec<Element>,
}

impl TreeNode {
    fn new(key: String, parents: Vec<String>) -> Self {
        Self {
            key,
            parents,
            children: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// One element per chunk processed since the last flush.
    pub fn payload(&self) -> &[Element] {
        &self.payload
    }

    pub fn push(&mut self, element: Element) {
        self.payload.push(element);
    }

    pub fn pop(&mut self) -> Option<Element> {
        self.payload.pop()
    }

    /// Drop this node's elements, releasing their reservations.
    pub fn clear_payload(&mut self) {
        self.payload.clear();
    }
}

#[derive(Debug)]
pub struct Tree {
    name: String,
    root: Option<String>,
    nodes: Vec<TreeNode>,
    index: HashMap<String, usize>,
    leaves: Vec<String>,
}

impl Tree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            nodes: Vec::new(),
            index: HashMap::new(),
            leaves: Vec::new(),
        }
    }

    /// Mirror a compiled sequence: add every entry, then derive children
    /// and leaves.
    pub fn from_sequence(name: impl Into<String>, sequence: &OrderedSequence) -> Result<Self> {
        let mut tree = Tree::new(name);
        for entry in sequence {
            tree.add_node(entry.id.clone(), entry.parents.clone())?;
        }
        tree.update_parents()?;
        tree.update_leaves();
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn add_node(&mut self, key: impl Into<String>, parents: Vec<String>) -> Result<()> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(Error::Plan(format!(
                "node {} already in tree {}",
                key, self.name
            )));
        }
        if key == INITIAL {
            self.root = Some(key.clone());
        }
        self.index.insert(key.clone(), self.nodes.len());
        self.nodes.push(TreeNode::new(key, parents));
        Ok(())
    }

    /// Rebuild every node's children from the parent lists.
    pub fn update_parents(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            node.children.clear();
        }
        for i in 0..self.nodes.len() {
            for p in 0..self.nodes[i].parents.len() {
                let parent = &self.nodes[i].parents[p];
                let Some(&j) = self.index.get(parent) else {
                    return Err(Error::Plan(format!(
                        "parent {} of {} is not in tree {}",
                        parent, self.nodes[i].key, self.name
                    )));
                };
                let child = self.nodes[i].key.clone();
                self.nodes[j].children.push(child);
            }
        }
        Ok(())
    }

    pub fn update_leaves(&mut self) {
        self.leaves = self
            .nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .map(|n| n.key.clone())
            .collect();
    }

    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    pub fn node(&self, key: &str) -> Option<&TreeNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut TreeNode> {
        self.index.get(key).map(|&i| &mut self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node holds a payload element.
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|n| n.payload.is_empty())
    }

    /// Drop every payload element; nodes stay.
    pub fn flush(&mut self) {
        let dropped: usize = self.nodes.iter().map(|n| n.payload.len()).sum();
        for node in &mut self.nodes {
            node.clear_payload();
        }
        debug!(tree = %self.name, elements = dropped, "tree flushed");
    }
}
