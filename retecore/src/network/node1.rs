//! Single-input tests.
//!
//! Every test looks at the lead fact of the token it receives. The vertex
//! plumbing around them (flush relay, forwarding, error decoration) lives in
//! [`crate::network::Network`].
use std::sync::Arc;

use crate::{
    accel::CompiledTest,
    base::{
        context::Context,
        fact::Fact,
        token::Token,
        value::{FactId, FunCall, Symbol, Value},
    },
    utils::error::{ErrorKind, ReteError, ReteResult},
};

pub trait Node1: std::fmt::Display {
    /// Run the test on `token`; `cx` is bound to the token and its lead fact.
    fn test(&self, token: &Token, cx: &Context<'_>) -> ReteResult<bool>;
}

/// Copy of `value` fit to be stored as test criteria: fact ids are zeroed and
/// call arguments are sanitised recursively.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::FactId(_) => Value::FactId(FactId(0)),
        Value::FunCall(call) => Value::FunCall(Arc::new(sanitize_call(call))),
        other => other.clone(),
    }
}

pub fn sanitize_call(call: &FunCall) -> FunCall {
    FunCall::new(call.name().clone(), call.args().iter().map(sanitize))
}

fn lead(token: &Token) -> ReteResult<&Arc<Fact>> {
    token
        .lead()
        .ok_or_else(|| ReteError::new(ErrorKind::EmptyToken))
}

/// Passes when the lead fact's template is `template` or descends from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTest {
    template: Symbol,
}

impl TypeTest {
    pub fn new(template: impl Into<Symbol>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &Symbol {
        &self.template
    }
}

impl Node1 for TypeTest {
    fn test(&self, token: &Token, cx: &Context<'_>) -> ReteResult<bool> {
        let max_depth = cx.engine().config().max_template_depth;
        lead(token)?.template().is_a(&self.template, max_depth)
    }
}

impl std::fmt::Display for TypeTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[TypeTest template={}]", self.template)
    }
}

/// Passes when a slot holds a list of exactly `len` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLengthTest {
    slot: usize,
    len: usize,
}

impl MultiLengthTest {
    pub fn new(slot: usize, len: usize) -> Self {
        Self { slot, len }
    }
}

impl Node1 for MultiLengthTest {
    fn test(&self, token: &Token, _cx: &Context<'_>) -> ReteResult<bool> {
        Ok(matches!(
            lead(token)?.slot(self.slot)?,
            Value::List(items) if items.len() == self.len
        ))
    }
}

impl std::fmt::Display for MultiLengthTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[MultiLengthTest slot={} len={}]", self.slot, self.len)
    }
}

/// Criteria shared by [`EqualTest`] and [`NotEqualTest`].
struct Criterion {
    slot: usize,
    value: Value,
    compiled: Option<CompiledTest>,
}

impl Criterion {
    fn new(slot: usize, value: &Value) -> Self {
        Self {
            slot,
            value: sanitize(value),
            compiled: None,
        }
    }

    fn call(&self) -> Option<&FunCall> {
        match &self.value {
            Value::FunCall(call) => Some(call),
            _ => None,
        }
    }

    fn evaluate_call(&self, call: &FunCall, cx: &Context<'_>) -> ReteResult<Value> {
        match &self.compiled {
            Some(compiled) => compiled(cx),
            None => call.execute(cx),
        }
    }
}

impl PartialEq for Criterion {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.value == other.value
    }
}

impl std::fmt::Debug for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Criterion")
            .field("slot", &self.slot)
            .field("value", &self.value)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

macro_rules! criterion_test {
    ($name:ident) => {
        impl $name {
            pub fn new(slot: usize, value: &Value) -> Self {
                Self(Criterion::new(slot, value))
            }

            pub fn slot(&self) -> usize {
                self.0.slot
            }

            /// Stored (sanitised) criteria.
            pub fn value(&self) -> &Value {
                &self.0.value
            }

            /// The call criterion, if the criteria is a call.
            pub fn call(&self) -> Option<&FunCall> {
                self.0.call()
            }

            pub fn is_compiled(&self) -> bool {
                self.0.compiled.is_some()
            }

            pub(crate) fn set_compiled(&mut self, compiled: CompiledTest) {
                self.0.compiled = Some(compiled);
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "[{} slot={} value={}]",
                    stringify!($name),
                    self.0.slot,
                    self.0.value
                )
            }
        }
    };
}

/// Literal criteria: the slot equals the resolved value. Call criteria: the call
/// does not yield FALSE. Calls are re-evaluated for every token.
#[derive(Debug, PartialEq)]
pub struct EqualTest(Criterion);

criterion_test!(EqualTest);

impl Node1 for EqualTest {
    fn test(&self, token: &Token, cx: &Context<'_>) -> ReteResult<bool> {
        let fact = lead(token)?;
        match self.0.call() {
            Some(call) => Ok(!self.0.evaluate_call(call, cx)?.is_false_atom()),
            None => Ok(cx.resolve(&self.0.value)? == *fact.slot(self.0.slot)?),
        }
    }
}

/// Literal criteria: the slot differs from the resolved value. Call criteria:
/// the call yields exactly FALSE.
#[derive(Debug, PartialEq)]
pub struct NotEqualTest(Criterion);

criterion_test!(NotEqualTest);

impl Node1 for NotEqualTest {
    fn test(&self, token: &Token, cx: &Context<'_>) -> ReteResult<bool> {
        let fact = lead(token)?;
        match self.0.call() {
            Some(call) => Ok(self.0.evaluate_call(call, cx)?.is_false_atom()),
            None => Ok(cx.resolve(&self.0.value)? != *fact.slot(self.0.slot)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        base::{Engine, token::TokenTag},
        tests_utils::animal_engine,
    };

    fn token_of(engine: &Engine, template: &str, slots: Vec<Value>) -> Token {
        let fact = engine.make_fact(template, slots).unwrap();
        Token::new(Arc::new(fact), TokenTag::Normal)
    }

    #[test]
    fn sanitize_zeroes_fact_ids_without_mutating() {
        let call = Value::funcall(
            "f",
            [
                Value::FactId(FactId(4)),
                Value::funcall("g", [Value::FactId(FactId(9)), Value::Integer(1)]),
            ],
        );
        let clean = sanitize(&call);
        assert_eq!(clean.to_string(), "(f <Fact-0> (g <Fact-0> 1))");
        assert_eq!(call.to_string(), "(f <Fact-4> (g <Fact-9> 1))");
        assert_eq!(sanitize(&Value::FactId(FactId(3))), Value::FactId(FactId(0)));
        assert_eq!(sanitize(&Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn type_test_accepts_descendants() {
        let engine = animal_engine();
        let passes = |t: &Token| -> bool {
            let cx = Context::for_token(&engine, t);
            TypeTest::new("Animal").test(t, &cx).unwrap()
        };
        let dog = token_of(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
        let rock = token_of(&engine, "Rock", vec![Value::Integer(3)]);
        assert!(passes(&dog));
        assert!(!passes(&rock));
    }

    #[test]
    fn length_test_ignores_scalars() {
        let engine = Engine::default();
        engine.templates().define("bag", None, &["items"]).unwrap();
        let test = MultiLengthTest::new(0, 3);
        let list = token_of(&engine, "bag", vec![Value::list([1, 2, 3].map(Value::Integer))]);
        let short = token_of(&engine, "bag", vec![Value::list([1, 2].map(Value::Integer))]);
        let scalar = token_of(&engine, "bag", vec![Value::Integer(3)]);
        for (token, expected) in [(&list, true), (&short, false), (&scalar, false)] {
            let cx = Context::for_token(&engine, token);
            assert_eq!(test.test(token, &cx).unwrap(), expected, "{}", token);
        }

        let out_of_range = MultiLengthTest::new(4, 3);
        let cx = Context::for_token(&engine, &list);
        let err = out_of_range.test(&list, &cx).unwrap_err();
        assert!(err.kind().is_slot_out_of_range());
    }

    #[test]
    fn literal_equality_is_complemented() {
        let engine = Engine::default();
        engine.templates().define("n", None, &["v"]).unwrap();
        let token = token_of(&engine, "n", vec![Value::Integer(3)]);
        let cx = Context::for_token(&engine, &token);

        for (value, equal) in [
            (Value::Integer(3), true),
            (Value::Integer(4), false),
            (Value::Long(3), false),
        ] {
            assert_eq!(EqualTest::new(0, &value).test(&token, &cx).unwrap(), equal);
            assert_eq!(NotEqualTest::new(0, &value).test(&token, &cx).unwrap(), !equal);
        }
    }

    #[test]
    fn call_criteria_use_false_as_the_only_failure() {
        let engine = Engine::default();
        engine.templates().define("n", None, &["v"]).unwrap();
        engine
            .functions()
            .define_fn("yield", |args, cx| cx.resolve(&args[0]));
        let token = token_of(&engine, "n", vec![Value::Integer(3)]);
        let cx = Context::for_token(&engine, &token);

        let call = |v: Value| Value::funcall("yield", [v]);
        assert!(EqualTest::new(0, &call(Value::atom("nil"))).test(&token, &cx).unwrap());
        assert!(!EqualTest::new(0, &call(Value::false_atom())).test(&token, &cx).unwrap());
        assert!(NotEqualTest::new(0, &call(Value::false_atom())).test(&token, &cx).unwrap());
        assert!(!NotEqualTest::new(0, &call(Value::atom("nil"))).test(&token, &cx).unwrap());
        assert!(!NotEqualTest::new(0, &call(Value::true_atom())).test(&token, &cx).unwrap());
    }

    #[test]
    fn call_criteria_do_not_read_their_slot() {
        let engine = Engine::default();
        engine.templates().define("n", None, &["v"]).unwrap();
        engine.functions().define_fn("yield", |args, cx| cx.resolve(&args[0]));
        let token = token_of(&engine, "n", vec![Value::Integer(3)]);
        let cx = Context::for_token(&engine, &token);

        let truthy = Value::funcall("yield", [Value::true_atom()]);
        assert!(EqualTest::new(9, &truthy).test(&token, &cx).unwrap());
        assert!(!NotEqualTest::new(9, &truthy).test(&token, &cx).unwrap());

        let err = EqualTest::new(9, &Value::Integer(3)).test(&token, &cx).unwrap_err();
        assert!(err.kind().is_slot_out_of_range());
        let err = NotEqualTest::new(9, &Value::Integer(3)).test(&token, &cx).unwrap_err();
        assert!(err.kind().is_slot_out_of_range());
    }

    #[test]
    fn criteria_equality_ignores_compilation() {
        let value = Value::funcall(">", [Value::variable("x"), Value::Integer(3)]);
        let mut compiled = EqualTest::new(1, &value);
        compiled.set_compiled(Box::new(|_: &Context<'_>| Ok(Value::true_atom())));
        assert_eq!(compiled, EqualTest::new(1, &value));
        assert_ne!(EqualTest::new(2, &value), EqualTest::new(1, &value));
        assert_eq!(compiled.to_string(), "[EqualTest slot=1 value=(> ?x 3)]");
        assert_eq!(
            NotEqualTest::new(0, &Value::atom("Rex")).to_string(),
            "[NotEqualTest slot=0 value=Rex]"
        );
    }
}
