//! Compiled fast path for call criteria.
//!
//! The network builder hands every call criterion to the engine's registered
//! [`Accelerator`]. A [`Compilation::Compiled`] closure replaces interpretation
//! of the call in [`crate::network::node1::EqualTest`] and
//! [`crate::network::node1::NotEqualTest`]; results must be identical to
//! [`FunCall::execute`] in every context.
use std::sync::Arc;

use log::debug;

use crate::{
    base::{
        Engine,
        context::Context,
        value::{FunCall, Value, Variable},
    },
    functions::{Callable, FunctionHolder, builtins::Comparison},
    network::node1::sanitize,
    utils::error::{ReteResult, ResultExt},
};

pub type CompiledTest = Box<dyn Fn(&Context<'_>) -> ReteResult<Value> + Send + Sync>;

pub enum Compilation {
    Compiled(CompiledTest),
    /// The call is interpreted; the string says why.
    Unavailable(String),
}

impl Compilation {
    pub fn is_compiled(&self) -> bool {
        matches!(self, Compilation::Compiled(_))
    }

    pub fn ok(self) -> Option<CompiledTest> {
        match self {
            Compilation::Compiled(test) => Some(test),
            Compilation::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for Compilation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compilation::Compiled(_) => write!(f, "Compiled"),
            Compilation::Unavailable(reason) => write!(f, "Unavailable({})", reason),
        }
    }
}

pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, call: &FunCall, engine: &Engine) -> Compilation;
}

/// Accelerator binding each call to its function holder ahead of time.
///
/// Arguments are sanitised once and nested calls are compiled recursively.
/// Comparisons whose operands are literals, variables or compiled calls skip
/// holder dispatch entirely while the holder still holds the comparison seen at
/// compile time; any rebinding or advice falls back to the holder.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindingAccelerator;

impl BindingAccelerator {
    pub fn new() -> Self {
        Self
    }

    fn bind(&self, call: &FunCall, engine: &Engine) -> Result<BoundCall, String> {
        let holder = engine.functions().holder(call.name());
        let callable = holder
            .current()
            .ok_or_else(|| format!("function `{}` is not defined", call.name()))?;

        let mut operands = Vec::with_capacity(call.args().len());
        for arg in call.args() {
            let operand = match arg {
                Value::External(_) => {
                    return Err(format!("cannot pre-bind external handle in {}", call));
                }
                Value::Variable(var) => Operand::Variable(var.clone()),
                Value::FunCall(nested) => Operand::Call(Box::new(self.bind(nested, engine)?)),
                literal => Operand::Literal(sanitize(literal)),
            };
            operands.push(operand);
        }

        let args: Vec<Value> = call.args().iter().map(sanitize).collect();
        Ok(BoundCall {
            call: FunCall::new(call.name().clone(), args),
            holder,
            callable,
            operands,
        })
    }
}

impl Accelerator for BindingAccelerator {
    fn name(&self) -> &str {
        "binding"
    }

    fn compile(&self, call: &FunCall, engine: &Engine) -> Compilation {
        match self.bind(call, engine) {
            Ok(bound) => {
                debug!("Compiled {}", bound.call);
                Compilation::Compiled(Box::new(move |cx: &Context<'_>| bound.run(cx)))
            }
            Err(reason) => Compilation::Unavailable(reason),
        }
    }
}

enum Operand {
    Literal(Value),
    Variable(Arc<Variable>),
    Call(Box<BoundCall>),
}

impl Operand {
    fn value(&self, cx: &Context<'_>) -> ReteResult<Value> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Variable(var) => cx.lookup(var),
            Operand::Call(call) => call.run(cx),
        }
    }
}

struct BoundCall {
    call: FunCall,
    holder: Arc<FunctionHolder>,
    /// Implementation seen at compile time.
    callable: Arc<Callable>,
    operands: Vec<Operand>,
}

impl BoundCall {
    fn run(&self, cx: &Context<'_>) -> ReteResult<Value> {
        if let Some(comparison) = self.direct_comparison() {
            let values = self
                .operands
                .iter()
                .map(|operand| operand.value(cx))
                .collect::<ReteResult<Vec<_>>>()
                .context_with(|| format!("evaluating {}", self.call))?;
            return comparison
                .op()
                .apply(&values)
                .map(Value::boolean)
                .context_with(|| format!("evaluating {}", self.call));
        }

        self.holder
            .invoke(self.call.args(), cx)
            .context_with(|| format!("evaluating {}", self.call))
    }

    /// The comparison to apply inline, if the holder is unchanged since
    /// compilation and carries no advice.
    fn direct_comparison(&self) -> Option<&Comparison> {
        let current = self.holder.current()?;
        if !Arc::ptr_eq(&current, &self.callable) {
            return None;
        }
        match self.callable.as_ref() {
            Callable::Plain(function) => function.downcast_ref::<Comparison>(),
            Callable::Wrapping { .. } => None,
        }
    }
}
