//! Builtin functions registered on every engine.
//!
//! Comparison builtins are implemented by [`Comparison`] so the accelerator can
//! recognise them and evaluate them without going through argument slices.
use std::cmp::Ordering;

use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{
    base::{context::Context, value::Value},
    functions::{FnFunction, FunctionRegistry, Userfunction},
    utils::error::{ErrorKind, ReteError, ReteResult},
};

/// Comparison operators available as builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum CompareOp {
    /// Kind-strict structural equality of every argument with the first.
    #[strum(serialize = "eq")]
    Eq,
    /// The first argument differs from every other one.
    #[strum(serialize = "neq")]
    Neq,
    #[strum(serialize = "=")]
    NumEq,
    #[strum(serialize = "<>")]
    NumNeq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
}

impl CompareOp {
    /// Apply the operator to already resolved arguments.
    pub fn apply(self, values: &[Value]) -> ReteResult<bool> {
        let Some((first, rest)) = values.split_first() else {
            return Err(ReteError::new(ErrorKind::WrongArgumentCount {
                function: self.to_string(),
                expected: "at least 2".to_string(),
                found: 0,
            }));
        };
        if rest.is_empty() {
            return Err(ReteError::new(ErrorKind::WrongArgumentCount {
                function: self.to_string(),
                expected: "at least 2".to_string(),
                found: 1,
            }));
        }

        match self {
            CompareOp::Eq => Ok(rest.iter().all(|v| v == first)),
            CompareOp::Neq => Ok(rest.iter().all(|v| v != first)),
            CompareOp::NumEq => {
                let first = first.numeric_value(None)?;
                for v in rest {
                    if first.partial_cmp(v.numeric_value(None)?) != Some(Ordering::Equal) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CompareOp::NumNeq => {
                let first = first.numeric_value(None)?;
                for v in rest {
                    if first.partial_cmp(v.numeric_value(None)?) == Some(Ordering::Equal) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => {
                let mut previous = first.numeric_value(None)?;
                for v in rest {
                    let next = v.numeric_value(None)?;
                    let holds = match (self, previous.partial_cmp(next)) {
                        (_, None) => false,
                        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
                        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
                        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
                        (_, Some(o)) => o != Ordering::Less,
                    };
                    if !holds {
                        return Ok(false);
                    }
                    previous = next;
                }
                Ok(true)
            }
        }
    }
}

/// Builtin comparison function.
pub struct Comparison {
    op: CompareOp,
}

impl Comparison {
    pub fn new(op: CompareOp) -> Self {
        Self { op }
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }
}

impl Userfunction for Comparison {
    fn name(&self) -> &str {
        self.op.into()
    }

    fn call(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        let values = args
            .iter()
            .map(|a| cx.resolve(a))
            .collect::<ReteResult<Vec<_>>>()?;
        Ok(Value::boolean(self.op.apply(&values)?))
    }
}

fn expect_args(name: &str, args: &[Value], expected: usize) -> ReteResult<()> {
    if args.len() != expected {
        return Err(ReteError::new(ErrorKind::WrongArgumentCount {
            function: name.to_string(),
            expected: expected.to_string(),
            found: args.len(),
        }));
    }
    Ok(())
}

fn and(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    for arg in args {
        if cx.resolve(arg)?.is_false_atom() {
            return Ok(Value::false_atom());
        }
    }
    Ok(Value::true_atom())
}

fn or(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    for arg in args {
        if !cx.resolve(arg)?.is_false_atom() {
            return Ok(Value::true_atom());
        }
    }
    Ok(Value::false_atom())
}

fn not(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    expect_args("not", args, 1)?;
    Ok(Value::boolean(cx.resolve(&args[0])?.is_false_atom()))
}

fn length(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    expect_args("length$", args, 1)?;
    Ok(Value::Integer(args[0].list_value(Some(cx))?.len() as i32))
}

/// `(nth$ index list)`, 1-based.
fn nth(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    expect_args("nth$", args, 2)?;
    let index = args[0].long_value(Some(cx))?;
    let list = args[1].list_value(Some(cx))?;
    usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| list.get(i).cloned())
        .ok_or_else(|| {
            ReteError::new(ErrorKind::IndexOutOfRange {
                index,
                len: list.len(),
            })
        })
}

/// `(member$ value list)`: 1-based position of the first occurrence, or FALSE.
fn member(args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
    expect_args("member$", args, 2)?;
    let needle = cx.resolve(&args[0])?;
    let list = args[1].list_value(Some(cx))?;
    Ok(list
        .iter()
        .position(|v| *v == needle)
        .map_or_else(Value::false_atom, |i| Value::Integer(i as i32 + 1)))
}

/// Register every builtin into `registry`.
pub fn register_all(registry: &FunctionRegistry) {
    for op in CompareOp::iter() {
        registry.define(Comparison::new(op));
    }
    registry.define(FnFunction::new("and", and));
    registry.define(FnFunction::new("or", or));
    registry.define(FnFunction::new("not", not));
    registry.define(FnFunction::new("length$", length));
    registry.define(FnFunction::new("nth$", nth));
    registry.define(FnFunction::new("member$", member));
}
