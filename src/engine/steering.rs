//! Steering: drives one input chunk at a time through the compiled plan.

use super::algo::{AlgoRegistry, Algorithm};
use super::book::uniform_edges;
use super::gate::Gate;
use super::timer::timed;
use super::tree::{Datum, Element, Tree};
use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::menu::{INITIAL, IOREQUEST, Menu, OrderedSequence};
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Algorithm names in first-use order, without the synthetic `iorequest`.
fn plan_algos(sequence: &OrderedSequence) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for entry in sequence {
        for algo in &entry.algos {
            if algo != IOREQUEST && !names.contains(&algo.as_str()) {
                names.push(algo);
            }
        }
    }
    names
}

#[derive(Debug)]
pub struct Steering {
    sequence: OrderedSequence,
    algos: Vec<Box<dyn Algorithm>>,
    index: HashMap<String, usize>,
    chunk: usize,
    locked: bool,
}

impl Steering {
    /// Name under which steering books its timing histograms.
    pub const NAME: &'static str = "steer";

    /// Pair a compiled menu with algorithm instances.
    ///
    /// Every algorithm the plan names must be supplied. Instances the plan
    /// never uses are dropped.
    pub fn new(menu: &Menu, algos: Vec<Box<dyn Algorithm>>) -> Result<Self> {
        if menu.root() != Some(INITIAL) {
            error!("menu {} is not rooted on {}", menu.name(), INITIAL);
            return Err(Error::Config(format!(
                "menu {} must be compiled with a single {} root",
                menu.name(),
                INITIAL
            )));
        }

        let mut by_name: HashMap<String, Box<dyn Algorithm>> = HashMap::new();
        for algo in algos {
            let name = algo.name().to_string();
            if by_name.insert(name.clone(), algo).is_some() {
                return Err(Error::Config(format!("algorithm {} supplied twice", name)));
            }
        }

        let sequence = menu.ordered_sequence().clone();
        let mut ordered = Vec::new();
        let mut index = HashMap::new();
        for name in plan_algos(&sequence) {
            let Some(algo) = by_name.remove(name) else {
                error!("algorithm {} is used by the menu but not configured", name);
                return Err(Error::AlgoNotFound(name.to_string()));
            };
            index.insert(name.to_string(), ordered.len());
            ordered.push(algo);
        }
        for unused in by_name.keys() {
            debug!("algorithm {} is not used by menu {}", unused, menu.name());
        }

        Ok(Self {
            sequence,
            algos: ordered,
            index,
            chunk: 0,
            locked: false,
        })
    }

    /// Instantiate the plan's algorithms from their tool configurations.
    pub fn from_config(menu: &Menu, tools: &[ToolConfig], registry: &AlgoRegistry) -> Result<Self> {
        let mut algos = Vec::new();
        for name in plan_algos(menu.ordered_sequence()) {
            let tool = tools.iter().find(|t| t.name == name).ok_or_else(|| {
                error!("no configuration for algorithm {}", name);
                Error::AlgoNotFound(name.to_string())
            })?;
            algos.push(registry.create(tool)?);
        }
        Self::new(menu, algos)
    }

    pub fn sequence(&self) -> &OrderedSequence {
        &self.sequence
    }

    /// Chunks executed so far.
    pub fn chunks(&self) -> usize {
        self.chunk
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn algo(&self, name: &str) -> Option<&dyn Algorithm> {
        self.index.get(name).map(|&i| self.algos[i].as_ref())
    }

    pub fn algos(&self) -> impl Iterator<Item = &dyn Algorithm> {
        self.algos.iter().map(|a| a.as_ref())
    }

    /// Initialize every algorithm, mirror the plan into the gate's tree and
    /// book timing histograms.
    pub fn initialize(&mut self, gate: &mut Gate) -> Result<()> {
        info!("initialize steering");
        for algo in &mut self.algos {
            if let Err(e) = algo.initialize() {
                error!("cannot initialize algorithm {}: {}", algo.name(), e);
                return Err(e);
            }
        }

        gate.tree = Tree::from_sequence(gate.name(), &self.sequence)?;
        info!(
            nodes = gate.tree.len(),
            leaves = ?gate.tree.leaves(),
            "tree initialized"
        );

        self.book(gate);
        Ok(())
    }

    /// Book `steer.time.<algo>` for every algorithm, then each algorithm's
    /// own histograms. Failures are logged and the job carries on.
    pub fn book(&mut self, gate: &mut Gate) {
        for algo in &mut self.algos {
            gate.timers.book(Self::NAME, algo.name());
            let name = format!("time.{}", algo.name());
            if let Err(e) = gate.book.book_timer(Self::NAME, &name, uniform_edges(0.0, 100.0, 50)) {
                error!("cannot book steering timer for {}: {}", algo.name(), e);
            }
            if let Err(e) = algo.book(&mut gate.book) {
                error!("cannot book {}: {}", algo.name(), e);
            }
        }
    }

    /// Reset histograms and timers after the sampling pass.
    pub fn rebook(&mut self, gate: &mut Gate) {
        gate.book.rebook();
        for algo in &mut self.algos {
            gate.timers.book(Self::NAME, algo.name());
            if let Err(e) = algo.rebook(&mut gate.book) {
                error!("cannot rebook {}: {}", algo.name(), e);
            }
        }
    }

    pub fn lock(&mut self) {
        self.locked = true;
        for algo in &mut self.algos {
            algo.lock();
        }
    }

    /// Process one input chunk through every node of the plan.
    ///
    /// On failure the elements already appended for this chunk are
    /// removed, so the tree only ever holds whole chunks.
    pub fn execute(&mut self, gate: &mut Gate, payload: Datum) -> Result<()> {
        let chunk = self.chunk;
        let mut visited: Vec<&str> = Vec::new();

        for entry in &self.sequence {
            let key = format!("{}_{}_{}", gate.tree.name(), entry.id, chunk);
            let mut element = Element::new(key, gate.pool().clone());

            if entry.id == INITIAL {
                element.attach(payload.clone());
            } else {
                for parent in &entry.parents {
                    let Some(last) = gate.tree.node(parent).and_then(|n| n.payload().last()) else {
                        discard(&mut gate.tree, &visited);
                        return Err(Error::Plan(format!(
                            "node {} has no data from parent {} for chunk {}",
                            entry.id, parent, chunk
                        )));
                    };
                    for datum in last.data() {
                        element.attach(datum.clone());
                    }
                }
            }

            for name in &entry.algos {
                if name == IOREQUEST {
                    continue;
                }
                let Some(&i) = self.index.get(name) else {
                    discard(&mut gate.tree, &visited);
                    return Err(Error::AlgoNotFound(name.clone()));
                };
                let algo = &mut self.algos[i];
                let (result, ms) = timed(|| algo.execute(&mut element, &mut gate.book));

                gate.timers.fill(Self::NAME, name, ms);
                if let Err(e) = gate.book.fill(Self::NAME, &format!("time.{}", name), ms) {
                    debug!("{}", e);
                }
                if let Err(e) = result {
                    error!(algo = %name, node = %entry.id, chunk, "algorithm failed: {}", e);
                    discard(&mut gate.tree, &visited);
                    return Err(e);
                }
            }

            let Some(node) = gate.tree.node_mut(&entry.id) else {
                discard(&mut gate.tree, &visited);
                return Err(Error::Plan(format!("node {} is not in the tree", entry.id)));
            };
            node.push(element);
            visited.push(&entry.id);
        }

        self.chunk += 1;
        debug!(chunk, "chunk steered");
        Ok(())
    }

    /// Finalize every algorithm in plan order. All are attempted; the
    /// first failure is returned afterwards.
    pub fn finalize(&mut self, gate: &mut Gate) -> Result<()> {
        info!("completed steering after {} chunks", self.chunk);
        let mut first: Option<Error> = None;
        for algo in &mut self.algos {
            if let Err(e) = algo.finalize() {
                error!("cannot finalize {}: {}", algo.name(), e);
                first.get_or_insert(e);
            }
            if let Some((mean, std)) = gate.timers.stats(Self::NAME, algo.name()) {
                info!("{} timing: {:.4} ms (std {:.4})", algo.name(), mean, std);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

fn discard(tree: &mut Tree, visited: &[&str]) {
    for id in visited {
        if let Some(node) = tree.node_mut(id) {
            node.pop();
        }
    }
}
