//! Single-input pattern network
//!
//! Vertices live in a [`slotmap`] arena under stable [`NodeId`]s; each has an
//! ordered successor list. Two call protocols exist:
//!
//! - [`Network::call_right`] is the protocol of single-input tests. A flush is
//!   relayed to every successor without running the test and reports "no
//!   match". Otherwise the test runs and, on success, the token is forwarded to
//!   every successor in registration order, depth-first.
//! - [`Network::call_left`] is only accepted by [`adapter::LeftToRight`] and
//!   sinks.
//!
//! Every invocation first announces itself on the engine's event bus, then
//! checks the engine's cancellation flag. Errors abort the current pass; what
//! was already forwarded to earlier successors stays delivered.
use std::sync::Arc;

use either::Either;
use log::debug;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::{
    accel::Compilation,
    base::{
        Engine,
        context::Context,
        fact::Fact,
        token::{Token, TokenTag},
        value::FunCall,
    },
    events::{Direction, NodeEvent},
    network::{
        adapter::{LeftToRight, RightToLeft},
        memory::TokenSink,
        node1::{EqualTest, MultiLengthTest, Node1, NotEqualTest, TypeTest},
    },
    utils::error::{ErrorKind, ReteError, ReteResult},
};

pub mod adapter;
pub mod memory;
pub mod node1;

new_key_type! {
    pub struct NodeId;
}

/// Behaviour of a vertex.
pub enum Node {
    Type(TypeTest),
    MultiLength(MultiLengthTest),
    Equal(EqualTest),
    NotEqual(NotEqualTest),
    LeftToRight(LeftToRight),
    RightToLeft(RightToLeft),
    Sink(Box<dyn TokenSink>),
}

impl Node {
    pub fn sink(sink: impl TokenSink) -> Self {
        Node::Sink(Box::new(sink))
    }

    /// The test of a single-input test vertex.
    pub fn as_test(&self) -> Option<&dyn Node1> {
        match self {
            Node::Type(t) => Some(t),
            Node::MultiLength(t) => Some(t),
            Node::Equal(t) => Some(t),
            Node::NotEqual(t) => Some(t),
            Node::LeftToRight(_) | Node::RightToLeft(_) | Node::Sink(_) => None,
        }
    }

    /// Whether an equal vertex may stand in for this one. Sinks are never
    /// shared.
    pub fn shares_with(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Type(a), Node::Type(b)) => a == b,
            (Node::MultiLength(a), Node::MultiLength(b)) => a == b,
            (Node::Equal(a), Node::Equal(b)) => a == b,
            (Node::NotEqual(a), Node::NotEqual(b)) => a == b,
            (Node::LeftToRight(_), Node::LeftToRight(_)) => true,
            (Node::RightToLeft(_), Node::RightToLeft(_)) => true,
            _ => false,
        }
    }

    /// Call criteria of an equality vertex.
    pub fn criteria_call(&self) -> Option<&FunCall> {
        match self {
            Node::Equal(test) => test.call(),
            Node::NotEqual(test) => test.call(),
            _ => None,
        }
    }

    /// Ask the engine to compile call criteria.
    fn prepare(&mut self, engine: &Engine) {
        let Some(call) = self.criteria_call().cloned() else {
            return;
        };
        let compiled = match engine.compile(&call) {
            Compilation::Compiled(compiled) => compiled,
            Compilation::Unavailable(reason) => {
                debug!("Interpreting criteria {}: {}", call, reason);
                return;
            }
        };
        debug!("Accelerated criteria {}", call);
        match self {
            Node::Equal(test) => test.set_compiled(compiled),
            Node::NotEqual(test) => test.set_compiled(compiled),
            _ => {}
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Type(t) => write!(f, "{}", t),
            Node::MultiLength(t) => write!(f, "{}", t),
            Node::Equal(t) => write!(f, "{}", t),
            Node::NotEqual(t) => write!(f, "{}", t),
            Node::LeftToRight(a) => write!(f, "{}", a),
            Node::RightToLeft(a) => write!(f, "{}", a),
            Node::Sink(sink) => write!(f, "[Sink {}]", sink.name()),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl From<TypeTest> for Node {
    fn from(test: TypeTest) -> Self {
        Node::Type(test)
    }
}

impl From<MultiLengthTest> for Node {
    fn from(test: MultiLengthTest) -> Self {
        Node::MultiLength(test)
    }
}

impl From<EqualTest> for Node {
    fn from(test: EqualTest) -> Self {
        Node::Equal(test)
    }
}

impl From<NotEqualTest> for Node {
    fn from(test: NotEqualTest) -> Self {
        Node::NotEqual(test)
    }
}

impl From<LeftToRight> for Node {
    fn from(adapter: LeftToRight) -> Self {
        Node::LeftToRight(adapter)
    }
}

impl From<RightToLeft> for Node {
    fn from(adapter: RightToLeft) -> Self {
        Node::RightToLeft(adapter)
    }
}

#[derive(Debug)]
pub struct Vertex {
    node: Node,
    successors: SmallVec<NodeId, 2>,
}

impl Vertex {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }
}

/// Arena of vertices plus the roots receiving asserted facts.
///
/// Sinks are not thread-safe, so neither is a network; a pass runs on the
/// thread owning it.
#[derive(Debug, Default)]
pub struct Network {
    vertices: SlotMap<NodeId, Vertex>,
    roots: SmallVec<NodeId, 4>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.vertices.get(id).map(Vertex::node)
    }

    /// Successors of `id`, in forwarding order. Empty for an unknown id.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        if let Some(vertex) = self.vertices.get(id) {
            Either::Left(vertex.successors.iter().copied())
        } else {
            Either::Right(std::iter::empty())
        }
    }

    /// Sink of vertex `id` as its concrete type.
    pub fn sink_as<T: TokenSink>(&self, id: NodeId) -> Option<&T> {
        match self.node(id)? {
            Node::Sink(sink) => sink.downcast_ref::<T>(),
            _ => None,
        }
    }

    fn vertex(&self, id: NodeId) -> ReteResult<&Vertex> {
        self.vertices
            .get(id)
            .ok_or_else(|| ReteError::new(ErrorKind::UnknownNode(format!("{:?}", id))))
    }

    fn insert(&mut self, engine: &Engine, mut node: Node) -> NodeId {
        node.prepare(engine);
        debug!("Adding vertex {}", node);
        self.vertices.insert(Vertex {
            node,
            successors: SmallVec::new(),
        })
    }

    /// Add a root vertex, reusing an equal existing root.
    pub fn add_root(&mut self, engine: &Engine, node: impl Into<Node>) -> NodeId {
        let node = node.into();
        if let Some(existing) = self.shared(&self.roots, &node) {
            return existing;
        }
        let id = self.insert(engine, node);
        self.roots.push(id);
        id
    }

    /// Add a vertex under `parent`, reusing an equal existing successor.
    pub fn add_node(
        &mut self,
        engine: &Engine,
        parent: NodeId,
        node: impl Into<Node>,
    ) -> ReteResult<NodeId> {
        let node = node.into();
        if let Some(existing) = self.shared(self.vertex(parent)?.successors(), &node) {
            return Ok(existing);
        }
        let id = self.insert(engine, node);
        self.attach(parent, id)?;
        Ok(id)
    }

    /// Add a fresh sink under `parent`.
    pub fn add_sink(
        &mut self,
        engine: &Engine,
        parent: NodeId,
        sink: impl TokenSink,
    ) -> ReteResult<NodeId> {
        self.vertex(parent)?;
        let id = self.insert(engine, Node::sink(sink));
        self.attach(parent, id)?;
        Ok(id)
    }

    /// Append an existing vertex to the successors of `parent`.
    pub fn connect(&mut self, parent: NodeId, child: NodeId) -> ReteResult<()> {
        self.vertex(child)?;
        self.attach(parent, child)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) -> ReteResult<()> {
        self.vertices
            .get_mut(parent)
            .ok_or_else(|| ReteError::new(ErrorKind::UnknownNode(format!("{:?}", parent))))?
            .successors
            .push(child);
        Ok(())
    }

    fn shared(&self, candidates: &[NodeId], node: &Node) -> Option<NodeId> {
        candidates.iter().copied().find(|id| {
            self.vertices
                .get(*id)
                .is_some_and(|vertex| vertex.node.shares_with(node))
        })
    }

    /// Route a single-fact token into every root.
    pub fn assert_fact(&self, engine: &Engine, fact: Arc<Fact>) -> ReteResult<()> {
        self.route(engine, &Token::new(fact, TokenTag::Normal))
    }

    /// Route the retraction of a previously asserted fact.
    pub fn retract_fact(&self, engine: &Engine, fact: Arc<Fact>) -> ReteResult<()> {
        self.route(engine, &Token::new(fact, TokenTag::Retract))
    }

    /// Tell every vertex to discard partial-match state.
    pub fn flush(&self, engine: &Engine) -> ReteResult<()> {
        self.route(engine, &Token::flush())
    }

    fn route(&self, engine: &Engine, token: &Token) -> ReteResult<()> {
        for root in self.roots.iter().copied() {
            self.call_right(engine, root, token)?;
        }
        Ok(())
    }

    /// Announce the call and honour cancellation.
    fn enter(
        &self,
        engine: &Engine,
        direction: Direction,
        id: NodeId,
        node: &Node,
        token: &Token,
    ) -> ReteResult<()> {
        let events = engine.events();
        if engine.config().broadcast_events && events.wants(direction) {
            events.broadcast(
                &NodeEvent {
                    direction,
                    id,
                    node,
                    token,
                },
                engine,
            );
        }
        if engine.is_cancelled() {
            return Err(ReteError::new(ErrorKind::Cancelled));
        }
        Ok(())
    }

    pub fn call_right(&self, engine: &Engine, id: NodeId, token: &Token) -> ReteResult<bool> {
        let vertex = self.vertex(id)?;
        self.enter(engine, Direction::Right, id, &vertex.node, token)?;

        match &vertex.node {
            Node::Sink(sink) => {
                sink.accept(Direction::Right, token, engine)
                    .map_err(|e| decorate(e, id, &vertex.node))?;
                Ok(true)
            }
            _ if token.is_flush() => {
                self.forward_right(engine, vertex, token)?;
                Ok(false)
            }
            Node::LeftToRight(_) => Err(unsupported(id, &vertex.node, Direction::Right)),
            Node::RightToLeft(_) => {
                self.forward_left(engine, vertex, token)?;
                Ok(true)
            }
            node => {
                let passed = match node.as_test() {
                    Some(test) => test
                        .test(token, &Context::for_token(engine, token))
                        .map_err(|e| decorate(e, id, node))?,
                    None => return Err(unsupported(id, node, Direction::Right)),
                };
                if passed {
                    self.forward_right(engine, vertex, token)?;
                }
                Ok(passed)
            }
        }
    }

    pub fn call_left(&self, engine: &Engine, id: NodeId, token: &Token) -> ReteResult<bool> {
        let vertex = self.vertex(id)?;
        self.enter(engine, Direction::Left, id, &vertex.node, token)?;

        match &vertex.node {
            Node::LeftToRight(_) => {
                self.forward_right(engine, vertex, token)?;
                Ok(true)
            }
            Node::Sink(sink) => {
                sink.accept(Direction::Left, token, engine)
                    .map_err(|e| decorate(e, id, &vertex.node))?;
                Ok(true)
            }
            node => Err(unsupported(id, node, Direction::Left)),
        }
    }

    fn forward_right(&self, engine: &Engine, vertex: &Vertex, token: &Token) -> ReteResult<()> {
        for successor in vertex.successors.iter().copied() {
            self.call_right(engine, successor, token)?;
        }
        Ok(())
    }

    fn forward_left(&self, engine: &Engine, vertex: &Vertex, token: &Token) -> ReteResult<()> {
        for successor in vertex.successors.iter().copied() {
            self.call_left(engine, successor, token)?;
        }
        Ok(())
    }
}

fn decorate(error: ReteError, id: NodeId, node: &Node) -> ReteError {
    error.context(format!("in node {:?} {}", id, node))
}

fn unsupported(id: NodeId, node: &Node, direction: Direction) -> ReteError {
    ReteError::new(ErrorKind::UnsupportedCall {
        node: format!("{:?} {}", id, node),
        direction: direction.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        base::value::Value,
        tests_utils::{RecordingSink, animal_engine, define_counter, fact},
    };

    fn recorder(network: &Network, id: NodeId) -> &RecordingSink {
        network.sink_as::<RecordingSink>(id).unwrap()
    }

    #[test]
    fn flush_is_relayed_without_testing() {
        let engine = animal_engine();
        let calls = define_counter(&engine, "probe");
        let probe = Value::funcall("probe", []);
        let variants: [Node; 5] = [
            TypeTest::new("Dog").into(),
            MultiLengthTest::new(0, 1).into(),
            EqualTest::new(0, &probe).into(),
            NotEqualTest::new(0, &probe).into(),
            RightToLeft.into(),
        ];

        for variant in variants {
            let mut network = Network::new();
            let id = network.add_root(&engine, variant);
            let sinks = [
                network.add_sink(&engine, id, RecordingSink::new()).unwrap(),
                network.add_sink(&engine, id, RecordingSink::new()).unwrap(),
            ];

            let flush = Token::flush();
            assert!(!network.call_right(&engine, id, &flush).unwrap());
            for sink in sinks {
                let received = recorder(&network, sink).received();
                assert_eq!(received.len(), 1);
                assert_eq!(received[0].0, Direction::Right);
                assert!(received[0].1.is_flush());
            }
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn adapters_switch_protocol() {
        let engine = animal_engine();
        let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
        let token = Token::new(rex, TokenTag::Normal);

        let mut network = Network::new();
        let forward = network.add_root(&engine, LeftToRight);
        let forward_sink = network.add_sink(&engine, forward, RecordingSink::new()).unwrap();
        let reverse = network.add_root(&engine, RightToLeft);
        let reverse_sink = network.add_sink(&engine, reverse, RecordingSink::new()).unwrap();

        assert!(network.call_left(&engine, forward, &token).unwrap());
        assert!(network.call_right(&engine, reverse, &token).unwrap());
        assert_eq!(recorder(&network, forward_sink).received()[0].0, Direction::Right);
        assert_eq!(recorder(&network, reverse_sink).received()[0].0, Direction::Left);

        let err = network.call_right(&engine, forward, &token).unwrap_err();
        assert!(err.kind().is_unsupported_call());
        let err = network.call_left(&engine, reverse, &token).unwrap_err();
        assert!(err.kind().is_unsupported_call());
    }

    #[test]
    fn left_to_right_relays_a_right_flush() {
        let engine = animal_engine();
        let mut network = Network::new();
        let forward = network.add_root(&engine, LeftToRight);
        let sink = network.add_sink(&engine, forward, RecordingSink::new()).unwrap();

        assert!(!network.call_right(&engine, forward, &Token::flush()).unwrap());
        let received = recorder(&network, sink).received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, Direction::Right);
        assert!(received[0].1.is_flush());
    }

    #[test]
    fn tests_reject_left_calls() {
        let engine = animal_engine();
        let mut network = Network::new();
        let id = network.add_root(&engine, TypeTest::new("Dog"));
        let err = network.call_left(&engine, id, &Token::flush()).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::UnsupportedCall { direction: "left", .. }
        ));
    }

    #[test]
    fn test_errors_carry_the_node_identity() {
        let engine = animal_engine();
        let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
        let mut network = Network::new();
        let id = network.add_root(&engine, EqualTest::new(7, &Value::atom("Rex")));

        let err = network
            .call_right(&engine, id, &Token::new(rex, TokenTag::Normal))
            .unwrap_err();
        assert!(err.kind().is_slot_out_of_range());
        assert!(
            err.trail()
                .iter()
                .any(|line| line.contains("[EqualTest slot=7 value=Rex]"))
        );
    }

    #[test]
    fn equal_vertices_are_shared_but_sinks_are_not() {
        let engine = animal_engine();
        let mut network = Network::new();
        let root = network.add_root(&engine, TypeTest::new("Dog"));
        assert_eq!(network.add_root(&engine, TypeTest::new("Dog")), root);

        let a = network
            .add_node(&engine, root, EqualTest::new(0, &Value::atom("Rex")))
            .unwrap();
        let b = network
            .add_node(&engine, root, EqualTest::new(0, &Value::atom("Rex")))
            .unwrap();
        let c = network
            .add_node(&engine, root, NotEqualTest::new(0, &Value::atom("Rex")))
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let s1 = network.add_sink(&engine, a, RecordingSink::new()).unwrap();
        let s2 = network.add_sink(&engine, a, RecordingSink::new()).unwrap();
        assert_ne!(s1, s2);
        assert_eq!(network.successors(a).collect::<Vec<_>>(), [s1, s2]);
        assert_eq!(network.len(), 5);
    }

    #[test]
    fn connect_adds_aliasing_successors() {
        let engine = animal_engine();
        let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
        let mut network = Network::new();
        let dogs = network.add_root(&engine, TypeTest::new("Dog"));
        let animals = network.add_root(&engine, TypeTest::new("Animal"));
        let sink = network.add_sink(&engine, dogs, RecordingSink::new()).unwrap();
        network.connect(animals, sink).unwrap();

        network.assert_fact(&engine, rex).unwrap();
        assert_eq!(recorder(&network, sink).len(), 2);
    }

    #[test]
    fn cancellation_stops_the_next_visit() {
        let engine = animal_engine();
        let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
        let mut network = Network::new();
        let root = network.add_root(&engine, TypeTest::new("Dog"));
        let sink = network.add_sink(&engine, root, RecordingSink::new()).unwrap();

        engine
            .cancel_handle()
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let err = network.assert_fact(&engine, rex.clone()).unwrap_err();
        assert!(err.kind().is_cancelled());
        assert!(recorder(&network, sink).is_empty());

        engine.reset_cancel();
        network.assert_fact(&engine, rex).unwrap();
        assert_eq!(recorder(&network, sink).len(), 1);
    }
}
