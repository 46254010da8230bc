//! End-to-end behavior of the plan compiler, steering and the collector.

use arrow::array::{ArrayRef, Int64Array};
use arrow::record_batch::RecordBatch;
use blockflow::Error;
use blockflow::algorithms::CsvParserAlgo;
use blockflow::config::{ToolConfig, WRITER_TOOL};
use blockflow::engine::{Algorithm, Datum, Element, Gate, HistBook, Steering, Tree};
use blockflow::io::{Collector, WriterTemplate};
use blockflow::menu::{Graph, Menu, Node, OrderedSequence};
use blockflow::properties::Properties;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

/// Appends its tag to every raw input it is given.
#[derive(Debug)]
struct Tag {
    name: String,
    properties: Properties,
}

impl Tag {
    fn boxed(name: &str) -> Box<dyn Algorithm> {
        Box::new(Tag {
            name: name.to_string(),
            properties: Properties::new(),
        })
    }
}

impl Algorithm for Tag {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn execute(&mut self, element: &mut Element, _book: &mut HistBook) -> blockflow::Result<()> {
        let mut out = Vec::new();
        for datum in element.data() {
            if let Some(raw) = datum.as_raw() {
                out.extend_from_slice(raw);
            }
        }
        out.extend_from_slice(self.name.as_bytes());
        element.set_data(Bytes::from(out));
        Ok(())
    }
}

fn raw(el: &Element) -> &[u8] {
    el.data()[0].as_raw().unwrap()
}

fn menu(graph: Graph) -> Menu {
    let mut graph = graph;
    graph.build().unwrap();
    let mut menu = Menu::new("scenario");
    menu.add(graph).unwrap();
    menu.build().unwrap();
    menu
}

fn diamond() -> Menu {
    let mut g = Graph::new("diamond");
    g.add(Node::new(["initial"], ["alg1", "alg2"], "seq1").unwrap());
    g.add(Node::new(["initial"], ["alg1", "alg2"], "seq2").unwrap());
    g.add(Node::new(["seq1", "seq2"], ["alg3"], "seq3").unwrap());
    g.add(Node::new(["seq3"], ["alg4"], "seq4").unwrap());
    menu(g)
}

fn keys(seq: &OrderedSequence) -> Vec<&str> {
    seq.keys().collect()
}

fn batch(names: [&str; 3]) -> RecordBatch {
    let col = || Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef;
    RecordBatch::try_from_iter(names.map(|n| (n, col()))).unwrap()
}

/// A gate whose tree is `initial -> leaf`.
fn leaf_gate() -> Gate {
    let mut seq = OrderedSequence::new();
    seq.insert("initial", vec!["iorequest".to_string()], vec![]);
    seq.insert("leaf", vec!["x".to_string()], vec!["initial".to_string()]);
    let mut gate = Gate::new("scenario");
    gate.tree = Tree::from_sequence("scenario", &seq).unwrap();
    gate
}

fn push(gate: &mut Gate, b: RecordBatch) {
    let chunk = gate.tree.node("leaf").unwrap().payload().len();
    let mut el = Element::new(format!("scenario_leaf_{}", chunk), gate.pool().clone());
    el.set_data(b);
    gate.tree.node_mut("leaf").unwrap().push(el);
}

fn collector(dir: &Path, max_malloc: usize) -> Collector {
    let tool = ToolConfig::new(WRITER_TOOL, "BufferOutputWriter");
    Collector::new(max_malloc, WriterTemplate::new(tool, "scenario", dir))
}

#[test]
fn linear_chain() {
    let mut g = Graph::new("chain");
    g.add(Node::new(["initial"], ["A"], "A").unwrap());
    g.add(Node::new(["A"], ["B"], "B").unwrap());
    let menu = menu(g);
    assert_eq!(keys(menu.ordered_sequence()), ["initial", "A", "B"]);

    let mut steering = Steering::new(&menu, vec![Tag::boxed("A"), Tag::boxed("B")]).unwrap();
    let mut gate = Gate::new("chain");
    steering.initialize(&mut gate).unwrap();
    steering
        .execute(&mut gate, Datum::Raw(Bytes::from_static(b"x")))
        .unwrap();

    let b = &gate.tree.node("B").unwrap().payload()[0];
    assert_eq!(b.key(), "chain_B_0");
    assert_eq!(raw(b), b"xAB");
}

#[test]
fn diamond_orders_join_after_both_branches() {
    let menu = diamond();
    assert_eq!(
        keys(menu.ordered_sequence()),
        ["initial", "seq1", "seq2", "seq3", "seq4"]
    );
    assert_eq!(menu.leaves().unwrap(), ["seq4"]);

    let algos = ["alg1", "alg2", "alg3", "alg4"].map(Tag::boxed).into();
    let mut steering = Steering::new(&menu, algos).unwrap();
    let mut gate = Gate::new("diamond");
    steering.initialize(&mut gate).unwrap();
    for _ in 0..2 {
        steering
            .execute(&mut gate, Datum::Raw(Bytes::from_static(b"x")))
            .unwrap();
    }

    // seq3 sees seq1 then seq2, in declared order.
    let seq3 = &gate.tree.node("seq3").unwrap().payload()[1];
    assert_eq!(raw(seq3), b"xalg1alg2xalg1alg2alg3");
    for id in ["initial", "seq1", "seq2", "seq3", "seq4"] {
        assert_eq!(gate.tree.node(id).unwrap().payload().len(), 2);
    }
}

#[test]
fn schema_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut gate = leaf_gate();
    push(&mut gate, batch(["a", "b", "c"]));
    let mut c = collector(dir.path(), usize::MAX);
    c.initialize(&mut gate).unwrap();

    push(&mut gate, batch(["d", "e", "f"]));
    let err = c.collect(&mut gate).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));

    let writer = c.writer("writer_leaf").unwrap();
    assert_eq!(writer.nbatches(), 0);
    assert_eq!(writer.nrecords(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn empty_payload_is_reported_every_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut gate = leaf_gate();
    push(&mut gate, batch(["a", "b", "c"]));
    let mut c = collector(dir.path(), usize::MAX);
    c.initialize(&mut gate).unwrap();

    // initialize flushed the tree; draining it again fails the same way.
    for _ in 0..2 {
        let err = c.collect(&mut gate).unwrap_err();
        assert!(matches!(err, Error::PayloadEmpty(ref leaf) if leaf == "leaf"));
    }
    assert_eq!(c.ncollects(), 0);
}

#[test]
fn memory_ceiling_triggers_one_drain() {
    let dir = tempfile::tempdir().unwrap();
    let mut g = Graph::new("csv");
    g.add(Node::new(["initial"], ["csvparser"], "parse").unwrap());
    let menu = menu(g);

    let parser = CsvParserAlgo::create("csvparser", Properties::new()).unwrap();
    let mut steering = Steering::new(&menu, vec![parser]).unwrap();
    let mut gate = Gate::new("csv");
    steering.initialize(&mut gate).unwrap();

    let block = || Datum::Raw(Bytes::from_static(b"a,b\n1,2\n3,4\n"));
    steering.execute(&mut gate, block()).unwrap();
    let mut c = collector(dir.path(), 0);
    c.initialize(&mut gate).unwrap();

    steering.execute(&mut gate, block()).unwrap();
    assert!(gate.pool().total_allocated_bytes() > 0);
    assert!(c.execute(&mut gate).unwrap());

    assert_eq!(c.ncollects(), 1);
    assert!(gate.tree.node("parse").unwrap().payload().is_empty());
    assert_eq!(gate.pool().total_allocated_bytes(), 0);
    assert_eq!(c.writer("writer_parse").unwrap().nrecords(), 2);
}

#[test]
fn menu_round_trips_through_its_message() {
    let menu = diamond();
    let msg = menu.to_msg();
    let text = msg.to_json().unwrap();
    let back = Menu::from_msg(&blockflow::menu::MenuMsg::from_json(&text).unwrap()).unwrap();

    assert!(back.is_from_msg());
    assert_eq!(back.uuid(), menu.uuid());
    assert_eq!(back.ordered_sequence(), menu.ordered_sequence());
    for (a, b) in menu.ordered_sequence().iter().zip(back.ordered_sequence()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.parents, b.parents);
        assert_eq!(a.algos, b.algos);
    }
}
