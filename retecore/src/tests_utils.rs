use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    base::{Engine, fact::Fact, token::Token, value::Value},
    events::Direction,
    network::memory::TokenSink,
    utils::error::ReteResult,
};

/// Engine with `Animal <- Dog`, `Animal <- Cat` and an unrelated `Rock`.
pub fn animal_engine() -> Engine {
    let engine = Engine::default();
    let templates = engine.templates();
    templates.define("Animal", None, &["name"]).unwrap();
    templates
        .define("Dog", Some("Animal"), &["name", "breed"])
        .unwrap();
    templates
        .define("Cat", Some("Animal"), &["name", "lives"])
        .unwrap();
    templates.define("Rock", None, &["weight"]).unwrap();
    engine
}

pub fn fact(engine: &Engine, template: &str, slots: Vec<Value>) -> Arc<Fact> {
    Arc::new(engine.make_fact(template, slots).unwrap())
}

/// Define `name` as a function returning TRUE and counting its calls.
pub fn define_counter(engine: &Engine, name: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    engine.functions().define_fn(name, move |_, _| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(Value::true_atom())
    });
    calls
}

/// Define `name` as a function answering TRUE, FALSE, TRUE, ...
pub fn define_alternating(engine: &Engine, name: &str) {
    let calls = AtomicUsize::new(0);
    engine.functions().define_fn(name, move |_, _| {
        Ok(Value::boolean(calls.fetch_add(1, Ordering::Relaxed) % 2 == 0))
    });
}

/// Sink recording every token with the protocol it arrived through.
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: RefCell<Vec<(Direction, Token)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<(Direction, Token)> {
        self.received.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.received.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.borrow().is_empty()
    }
}

impl TokenSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn accept(&self, direction: Direction, token: &Token, _engine: &Engine) -> ReteResult<()> {
        self.received.borrow_mut().push((direction, token.clone()));
        Ok(())
    }
}
