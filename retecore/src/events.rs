//! Event broadcast
//!
//! Every node invocation announces itself on the engine's [`EventBus`] before
//! doing any work. Broadcasting is purely observational:
//!
//! - the "nobody listens" check is one relaxed atomic load of the union of the
//!   subscribers' masks, done before anything is allocated;
//! - handlers run synchronously on the matching thread, in subscription order;
//! - a handler error or panic is caught at the broadcast site and reported to
//!   the diagnostic sink (a `log::warn!` unless replaced). It never reaches the
//!   node that emitted the event.
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use bitflags::bitflags;
use log::{trace, warn};
use parking_lot::RwLock;
use slotmap::Key;
use strum::{Display, EnumIs, IntoStaticStr};
use uuid::Uuid;

use crate::{
    base::{
        Engine,
        context::Context,
        fact::Fact,
        token::Token,
        value::{Symbol, Value},
    },
    network::{Node, NodeId},
    utils::error::{ErrorKind, ReteError, ReteResult},
};

/// Call protocol through which a node was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIs)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn mask(self) -> EventMask {
        match self {
            Direction::Left => EventMask::CALL_LEFT,
            Direction::Right => EventMask::CALL_RIGHT,
        }
    }
}

bitflags! {
    /// Selects which node invocations a subscriber is told about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const CALL_LEFT = 1 << 0;
        const CALL_RIGHT = 1 << 1;
        const ALL = Self::CALL_LEFT.bits() | Self::CALL_RIGHT.bits();
    }
}

/// One node invocation.
#[derive(Debug, Clone, Copy)]
pub struct NodeEvent<'a> {
    pub direction: Direction,
    pub id: NodeId,
    pub node: &'a Node,
    pub token: &'a Token,
}

impl<'a> NodeEvent<'a> {
    /// Lead fact of the token, absent for a flush.
    pub fn fact(&self) -> Option<&'a Arc<Fact>> {
        self.token.lead()
    }

    /// Stable integer form of the node id, as handed to engine functions.
    pub fn node_number(&self) -> i64 {
        self.id.data().as_ffi() as i64
    }
}

impl std::fmt::Display for NodeEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{} {} {}", self.direction, self.node, self.token)
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &NodeEvent<'_>, engine: &Engine) -> ReteResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&NodeEvent<'_>, &Engine) -> ReteResult<()> + Send + Sync,
{
    fn handle(&self, event: &NodeEvent<'_>, engine: &Engine) -> ReteResult<()> {
        self(event, engine)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// How a subscriber failed.
#[derive(Debug)]
pub enum SubscriberFailure {
    Error(ReteError),
    Panic(String),
}

/// Report of a subscriber failure, handed to the diagnostic sink.
#[derive(Debug)]
pub struct Diagnostic {
    pub subscription: SubscriptionId,
    pub event: String,
    pub failure: SubscriberFailure,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.failure {
            SubscriberFailure::Error(e) => write!(f, "event subscriber failed on `{}`: {}", self.event, e),
            SubscriberFailure::Panic(p) => write!(f, "event subscriber panicked on `{}`: {}", self.event, p),
        }
    }
}

pub type DiagnosticSink = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    mask: EventMask,
    handler: Arc<dyn EventHandler>,
}

/// Engine-wide subscriber list.
pub struct EventBus {
    mask: AtomicU32,
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
    diagnostics: RwLock<DiagnosticSink>,
}

impl EventBus {
    pub fn new() -> Self {
        let diagnostics: DiagnosticSink = Arc::new(|diagnostic: &Diagnostic| {
            warn!("{}", diagnostic);
        });
        Self {
            mask: AtomicU32::new(0),
            subscribers: RwLock::new(Arc::new(Vec::new())),
            diagnostics: RwLock::new(diagnostics),
        }
    }

    pub fn subscribe(&self, mask: EventMask, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        let mut subscribers = self.subscribers.write();
        let mut next = subscribers.as_ref().clone();
        next.push(Subscriber { id, mask, handler });
        self.publish(&mut subscribers, next);
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        if !subscribers.iter().any(|s| s.id == id) {
            return false;
        }
        let next: Vec<Subscriber> = subscribers
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        self.publish(&mut subscribers, next);
        true
    }

    fn publish(&self, slot: &mut Arc<Vec<Subscriber>>, next: Vec<Subscriber>) {
        let mask = next
            .iter()
            .fold(EventMask::empty(), |acc, s| acc | s.mask);
        *slot = Arc::new(next);
        self.mask.store(mask.bits(), Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the sink receiving subscriber failures.
    pub fn set_diagnostic_sink(&self, sink: DiagnosticSink) {
        *self.diagnostics.write() = sink;
    }

    /// Whether any subscriber listens to `direction`.
    #[inline]
    pub fn wants(&self, direction: Direction) -> bool {
        self.mask.load(Ordering::Relaxed) & direction.mask().bits() != 0
    }

    /// Deliver `event` to every interested subscriber.
    pub fn broadcast(&self, event: &NodeEvent<'_>, engine: &Engine) {
        if !self.wants(event.direction) {
            return;
        }

        // Handlers may (un)subscribe; iterate over a snapshot.
        let snapshot = self.subscribers.read().clone();
        for subscriber in snapshot.iter() {
            if !subscriber.mask.contains(event.direction.mask()) {
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                subscriber.handler.handle(event, engine)
            }));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => SubscriberFailure::Error(e),
                Err(payload) => SubscriberFailure::Panic(
                    payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string()),
                ),
            };
            self.report(Diagnostic {
                subscription: subscriber.id,
                event: event.to_string(),
                failure,
            });
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        let sink = self.diagnostics.read().clone();
        // A panicking sink must not unwind into matching either.
        if catch_unwind(AssertUnwindSafe(|| sink(&diagnostic))).is_err() {
            warn!("diagnostic sink panicked while reporting: {}", diagnostic);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every event at `trace` level.
pub struct LogTracer;

impl EventHandler for LogTracer {
    fn handle(&self, event: &NodeEvent<'_>, _engine: &Engine) -> ReteResult<()> {
        trace!("{}", event);
        Ok(())
    }
}

/// Calls an engine function for every event with arguments
/// `(direction node-number lead-fact)`; the lead fact is `nil` for a flush.
pub struct FunctionTrigger {
    function: Symbol,
}

impl FunctionTrigger {
    pub fn new(function: impl Into<Symbol>) -> Self {
        Self {
            function: function.into(),
        }
    }
}

impl EventHandler for FunctionTrigger {
    fn handle(&self, event: &NodeEvent<'_>, engine: &Engine) -> ReteResult<()> {
        let args = [
            Value::atom(<&str>::from(event.direction)),
            Value::Long(event.node_number()),
            event.fact().cloned().map_or_else(Value::nil, Value::Fact),
        ];
        let cx = Context::for_token(engine, event.token);
        engine
            .functions()
            .holder(&self.function)
            .invoke(&args, &cx)
            .map(|_| ())
            .map_err(|e| {
                ReteError::caused_by(
                    ErrorKind::Other(format!("event trigger `{}` failed", self.function)),
                    e,
                )
            })
    }
}
