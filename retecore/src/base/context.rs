use std::{collections::HashMap, sync::Arc};

use crate::{
    base::{
        Engine,
        fact::Fact,
        token::Token,
        value::{FactRef, FunCall, Symbol, Value, Variable},
    },
    utils::error::{ErrorKind, ReteError, ReteResult},
};

/// A frame of lexical variable bindings. Lookups fall back to the parent frame.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    vars: HashMap<Symbol, Value>,
    parent: Option<Arc<Bindings>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<Bindings>) -> Self {
        Self {
            vars: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn set(&mut self, name: impl Into<Symbol>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if let Some(value) = current.vars.get(name) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }
}

/// Transient evaluation frame for one test evaluation.
///
/// Contexts only borrow; deriving a modified frame is a cheap copy.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    engine: &'a Engine,
    fact: Option<&'a Arc<Fact>>,
    token: Option<&'a Token>,
    bindings: Option<&'a Bindings>,
    in_advice: bool,
}

impl<'a> Context<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            fact: None,
            token: None,
            bindings: None,
            in_advice: false,
        }
    }

    /// Frame bound to `token` with its lead fact as the current fact.
    pub fn for_token(engine: &'a Engine, token: &'a Token) -> Self {
        Self {
            fact: token.lead(),
            token: Some(token),
            ..Self::new(engine)
        }
    }

    pub fn with_fact(self, fact: &'a Arc<Fact>) -> Self {
        Self {
            fact: Some(fact),
            ..self
        }
    }

    pub fn with_bindings(self, bindings: &'a Bindings) -> Self {
        Self {
            bindings: Some(bindings),
            ..self
        }
    }

    /// Same frame with the interception flag raised.
    pub fn inside_advice(self) -> Self {
        Self {
            in_advice: true,
            ..self
        }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn fact(&self) -> Option<&'a Arc<Fact>> {
        self.fact
    }

    pub fn token(&self) -> Option<&'a Token> {
        self.token
    }

    pub fn bindings(&self) -> Option<&'a Bindings> {
        self.bindings
    }

    pub fn in_advice(&self) -> bool {
        self.in_advice
    }

    /// Resolve `value` one step in this frame.
    pub fn resolve(&self, value: &Value) -> ReteResult<Value> {
        value.resolve(Some(self))
    }

    pub fn call(&self, call: &FunCall) -> ReteResult<Value> {
        call.execute(self)
    }

    /// Value of a variable: its slot binding when it has one, otherwise the
    /// lexical bindings.
    pub fn lookup(&self, var: &Variable) -> ReteResult<Value> {
        let unbound = || ReteError::new(ErrorKind::UnboundVariable(var.name.to_string()));

        if let Some(binding) = var.binding {
            let fact = match binding.fact {
                FactRef::Current => self.fact,
                FactRef::Token(index) => self.token.and_then(|t| t.fact(index)),
            }
            .ok_or_else(unbound)?;
            return fact
                .slot(binding.slot)
                .cloned()
                .map_err(|e| e.context(format!("reading ?{}", var.name)));
        }

        self.bindings
            .and_then(|b| b.get(&var.name))
            .cloned()
            .ok_or_else(unbound)
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("fact", &self.fact.map(|f| f.id()))
            .field("token", &self.token.map(|t| t.len()))
            .field("in_advice", &self.in_advice)
            .finish()
    }
}
