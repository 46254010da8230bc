//! Plan-level node: an id, the ids it consumes, and the algorithms that
//! produce it.

use super::graph::Graph;
use crate::error::{Error, Result};
use std::fmt;

/// Id of the synthetic entry node that receives raw input chunks.
pub const INITIAL: &str = "initial";

/// Algorithm name attached to the initial node in a compiled plan.
pub const IOREQUEST: &str = "iorequest";

/// Parent ids that mean "no parent" in hand-written graphs.
pub(crate) fn is_sentinel(id: &str) -> bool {
    id.is_empty() || id == "none"
}

/// A parent reference as supplied by the user.
///
/// A graph stands for its leaves; it is resolved to ids when the node is
/// constructed and never stored in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    Id(String),
    Leaves(Vec<String>),
}

impl From<&str> for ParentRef {
    fn from(id: &str) -> Self {
        ParentRef::Id(id.to_string())
    }
}

impl From<String> for ParentRef {
    fn from(id: String) -> Self {
        ParentRef::Id(id)
    }
}

impl From<&Graph> for ParentRef {
    fn from(graph: &Graph) -> Self {
        ParentRef::Leaves(graph.leaves().to_vec())
    }
}

/// Immutable plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: String,
    parents: Vec<String>,
    algos: Vec<String>,
}

impl Node {
    /// Build a node, resolving graph parents to their leaves.
    ///
    /// Only `initial` may have no parents, and no node may list itself.
    pub fn new<P, A, S>(parents: P, algos: A, id: impl Into<String>) -> Result<Self>
    where
        P: IntoIterator,
        P::Item: Into<ParentRef>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::Plan("node id cannot be empty".to_string()));
        }

        let mut resolved = Vec::new();
        for parent in parents {
            match parent.into() {
                ParentRef::Id(p) => {
                    if !is_sentinel(&p) {
                        resolved.push(p);
                    }
                }
                ParentRef::Leaves(leaves) => {
                    if leaves.is_empty() {
                        return Err(Error::Plan(format!(
                            "node {} uses a graph with no leaves as parent (graph not built?)",
                            id
                        )));
                    }
                    resolved.extend(leaves);
                }
            }
        }

        if resolved.iter().any(|p| *p == id) {
            return Err(Error::Plan(format!("node {} lists itself as parent", id)));
        }
        if resolved.is_empty() && id != INITIAL {
            return Err(Error::Plan(format!("node {} has no parents", id)));
        }

        Ok(Self {
            id,
            parents: resolved,
            algos: algos.into_iter().map(Into::into).collect(),
        })
    }

    /// The synthetic entry node. It carries no algorithms until the menu
    /// compiles it.
    pub fn initial() -> Self {
        Self {
            id: INITIAL.to_string(),
            parents: Vec::new(),
            algos: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn algos(&self) -> &[String] {
        &self.algos
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- [{}] ({})",
            self.id,
            self.parents.join(", "),
            self.algos.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_self_parent() {
        assert!(Node::new(["a"], ["x"], "a").is_err());
    }

    #[test]
    fn only_initial_may_be_parentless() {
        assert!(Node::new(Vec::<&str>::new(), ["x"], "a").is_err());
        assert!(Node::new(Vec::<&str>::new(), Vec::<&str>::new(), INITIAL).is_ok());
    }

    #[test]
    fn drops_sentinel_parents() {
        let n = Node::new(["none", "", "initial"], ["x"], "a").unwrap();
        assert_eq!(n.parents(), ["initial".to_string()]);
    }
}
