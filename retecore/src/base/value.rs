//! Value model
//!
//! [`Value`] is the tagged union stored in fact slots and used as test criteria.
//! Scalars are plain data; two kinds are *deferred*:
//!
//! - [`Value::FunCall`] is an unevaluated call. It is self-resolving: every typed
//!   accessor first evaluates the call in the supplied [`Context`] and reads the
//!   result. Resolving a call without a context is an error.
//! - [`Value::Variable`] is resolved either through its slot binding (a slot of the
//!   current fact or of a fact of the current token) or through the lexical
//!   bindings of the context.
//!
//! Equality is structural and kind-strict: `Integer(3)`, `Long(3)` and
//! `Float(3.0)` are three different values.
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use strum::{Display, EnumIs, IntoStaticStr};

use crate::{
    base::{context::Context, fact::Fact},
    magic::{FALSE_ATOM, NIL_ATOM, TRUE_ATOM},
    utils::{
        error::{ErrorKind, ReteError, ReteResult, ResultExt},
        opaque::OpaqueObject,
        ref_id::ArcRefId,
    },
};

/// Shared immutable string used for atoms, strings and names.
pub type Symbol = Arc<str>;

/// Identifier assigned to a fact when it is created by an engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactId(pub u64);

impl FactId {
    /// Placeholder id, also what [`crate::network::node1::sanitize`] zeroes ids to.
    pub const NONE: FactId = FactId(0);
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Fact-{}>", self.0)
    }
}

/// Which fact a slot binding reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactRef {
    /// The fact under test.
    Current,
    /// The fact at this position of the current token (0 is the oldest).
    Token(usize),
}

/// Binds a variable to a slot of a fact available in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotBinding {
    pub fact: FactRef,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Symbol,
    pub binding: Option<SlotBinding>,
}

/// An unevaluated call: function name plus raw (unresolved) arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunCall {
    name: Symbol,
    args: Vec<Value>,
}

impl FunCall {
    pub fn new(name: impl Into<Symbol>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Evaluate the call in `cx`.
    pub fn execute(&self, cx: &Context<'_>) -> ReteResult<Value> {
        cx.engine()
            .functions()
            .holder(&self.name)
            .invoke(&self.args, cx)
            .context_with(|| format!("evaluating {}", self))
    }
}

impl std::fmt::Display for FunCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

/// Host object reference, compared by identity.
pub type ExternalHandle = ArcRefId<dyn OpaqueObject>;

/// Kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum ValueKind {
    Atom,
    String,
    Integer,
    Float,
    Long,
    List,
    Funcall,
    Fact,
    FactId,
    Variable,
    External,
}

#[derive(Debug, Clone, EnumIs)]
pub enum Value {
    Atom(Symbol),
    String(Symbol),
    Integer(i32),
    Float(f64),
    Long(i64),
    List(Arc<[Value]>),
    FunCall(Arc<FunCall>),
    Fact(Arc<Fact>),
    FactId(FactId),
    Variable(Arc<Variable>),
    External(ExternalHandle),
}

impl Value {
    pub fn atom(name: impl Into<Symbol>) -> Self {
        Value::Atom(name.into())
    }

    pub fn string(text: impl Into<Symbol>) -> Self {
        Value::String(text.into())
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    pub fn funcall(name: impl Into<Symbol>, args: impl IntoIterator<Item = Value>) -> Self {
        Value::FunCall(Arc::new(FunCall::new(name, args)))
    }

    /// A variable resolved through the lexical bindings of the context.
    pub fn variable(name: impl Into<Symbol>) -> Self {
        Value::Variable(Arc::new(Variable {
            name: name.into(),
            binding: None,
        }))
    }

    /// A variable bound to slot `slot` of the fact designated by `fact`.
    pub fn slot_variable(name: impl Into<Symbol>, fact: FactRef, slot: usize) -> Self {
        Value::Variable(Arc::new(Variable {
            name: name.into(),
            binding: Some(SlotBinding { fact, slot }),
        }))
    }

    pub fn external<T: OpaqueObject>(object: T) -> Self {
        let object: Arc<dyn OpaqueObject> = Arc::new(object);
        Value::External(ArcRefId::new(object))
    }

    pub fn nil() -> Self {
        Value::atom(NIL_ATOM)
    }

    pub fn true_atom() -> Self {
        Value::atom(TRUE_ATOM)
    }

    pub fn false_atom() -> Self {
        Value::atom(FALSE_ATOM)
    }

    pub fn boolean(b: bool) -> Self {
        if b { Self::true_atom() } else { Self::false_atom() }
    }

    /// `true` iff this is exactly the FALSE sentinel.
    pub fn is_false_atom(&self) -> bool {
        matches!(self, Value::Atom(a) if &**a == FALSE_ATOM)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Atom(_) => ValueKind::Atom,
            Value::String(_) => ValueKind::String,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Long(_) => ValueKind::Long,
            Value::List(_) => ValueKind::List,
            Value::FunCall(_) => ValueKind::Funcall,
            Value::Fact(_) => ValueKind::Fact,
            Value::FactId(_) => ValueKind::FactId,
            Value::Variable(_) => ValueKind::Variable,
            Value::External(_) => ValueKind::External,
        }
    }

    /// Whether resolving this value may depend on the context.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::FunCall(_) | Value::Variable(_))
    }

    /// Resolve deferred values one step: calls are evaluated, variables looked up.
    /// Any other value resolves to itself.
    pub fn resolve(&self, cx: Option<&Context<'_>>) -> ReteResult<Value> {
        match self {
            Value::FunCall(call) => match cx {
                Some(cx) => call.execute(cx),
                None => Err(ReteError::new(ErrorKind::NoContext {
                    call: call.to_string(),
                })),
            },
            Value::Variable(var) => match cx {
                Some(cx) => cx.lookup(var),
                None => Err(ReteError::new(ErrorKind::UnboundVariable(
                    var.name.to_string(),
                ))),
            },
            other => Ok(other.clone()),
        }
    }

    fn wrong_kind(&self, expected: &'static str) -> ReteError {
        ReteError::new(ErrorKind::WrongKind {
            expected,
            found: self.kind().into(),
            value: self.to_string(),
        })
    }

    pub fn int_value(&self, cx: Option<&Context<'_>>) -> ReteResult<i32> {
        match self.resolve(cx)? {
            Value::Integer(i) => Ok(i),
            Value::Long(l) => i32::try_from(l).map_err(|_| Value::Long(l).wrong_kind("INTEGER")),
            Value::Float(f) if (i32::MIN as f64..=i32::MAX as f64).contains(&f.trunc()) => {
                Ok(f as i32)
            }
            other => Err(other.wrong_kind("INTEGER")),
        }
    }

    pub fn long_value(&self, cx: Option<&Context<'_>>) -> ReteResult<i64> {
        match self.resolve(cx)? {
            Value::Integer(i) => Ok(i as i64),
            Value::Long(l) => Ok(l),
            // i64::MAX rounds up to 2^63 as a float, so the upper bound is open.
            Value::Float(f) if f.trunc() >= i64::MIN as f64 && f.trunc() < i64::MAX as f64 => {
                Ok(f as i64)
            }
            other => Err(other.wrong_kind("LONG")),
        }
    }

    pub fn float_value(&self, cx: Option<&Context<'_>>) -> ReteResult<f64> {
        match self.resolve(cx)? {
            Value::Integer(i) => Ok(i as f64),
            Value::Long(l) => Ok(l as f64),
            Value::Float(f) => Ok(f),
            other => Err(other.wrong_kind("FLOAT")),
        }
    }

    pub fn atom_value(&self, cx: Option<&Context<'_>>) -> ReteResult<Symbol> {
        match self.resolve(cx)? {
            Value::Atom(a) => Ok(a),
            other => Err(other.wrong_kind("ATOM")),
        }
    }

    /// Text of an atom or a string.
    pub fn string_value(&self, cx: Option<&Context<'_>>) -> ReteResult<Symbol> {
        match self.resolve(cx)? {
            Value::Atom(s) | Value::String(s) => Ok(s),
            other => Err(other.wrong_kind("STRING")),
        }
    }

    pub fn list_value(&self, cx: Option<&Context<'_>>) -> ReteResult<Arc<[Value]>> {
        match self.resolve(cx)? {
            Value::List(l) => Ok(l),
            other => Err(other.wrong_kind("LIST")),
        }
    }

    pub fn fact_value(&self, cx: Option<&Context<'_>>) -> ReteResult<Arc<Fact>> {
        match self.resolve(cx)? {
            Value::Fact(f) => Ok(f),
            other => Err(other.wrong_kind("FACT")),
        }
    }

    pub fn fact_id_value(&self, cx: Option<&Context<'_>>) -> ReteResult<FactId> {
        match self.resolve(cx)? {
            Value::FactId(id) => Ok(id),
            Value::Fact(f) => Ok(f.id()),
            other => Err(other.wrong_kind("FACT-ID")),
        }
    }

    pub fn funcall_value(&self) -> ReteResult<&Arc<FunCall>> {
        match self {
            Value::FunCall(call) => Ok(call),
            other => Err(other.wrong_kind("FUNCALL")),
        }
    }

    /// Numeric view used by arithmetic comparisons.
    pub fn numeric_value(&self, cx: Option<&Context<'_>>) -> ReteResult<Number> {
        match self.resolve(cx)? {
            Value::Integer(i) => Ok(Number::Int(i as i64)),
            Value::Long(l) => Ok(Number::Int(l)),
            Value::Float(f) => Ok(Number::Float(f)),
            other => Err(other.wrong_kind("NUMBER")),
        }
    }
}

/// Numeric value with integer/float promotion.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn partial_cmp(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::FunCall(a), Value::FunCall(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Fact(a), Value::Fact(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::FactId(a), Value::FactId(b)) => a == b,
            (Value::Variable(a), Value::Variable(b)) => a == b,
            (Value::External(a), Value::External(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Value::Atom(s) | Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_bits(*f).hash(state),
            Value::Long(l) => l.hash(state),
            Value::List(l) => l.hash(state),
            Value::FunCall(c) => c.hash(state),
            Value::Fact(f) => f.hash(state),
            Value::FactId(id) => id.hash(state),
            Value::Variable(v) => v.hash(state),
            Value::External(e) => e.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Atom(a) => write!(f, "{}", a),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Long(l) => write!(f, "{}", l),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::FunCall(call) => write!(f, "{}", call),
            Value::Fact(fact) => write!(f, "{}", fact.id()),
            Value::FactId(id) => write!(f, "{}", id),
            Value::Variable(var) => write!(f, "?{}", var.name),
            Value::External(handle) => write!(f, "<External-{:?}>", handle.as_ref()),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<FactId> for Value {
    fn from(value: FactId) -> Self {
        Value::FactId(value)
    }
}

impl From<Arc<Fact>> for Value {
    fn from(value: Arc<Fact>) -> Self {
        Value::Fact(value)
    }
}
