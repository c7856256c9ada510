//! Function indirection
//!
//! Calls embedded in test criteria name their function; the name is bound to a
//! [`FunctionHolder`] that stores the *current* implementation. Holders are
//! created on first reference and never replaced, so nodes built before a
//! definition (or before a redefinition) always dispatch to the latest one.
//!
//! An implementation is a [`Callable`]: either a plain [`Userfunction`] or an
//! advice wrapper around an inner callable. See [`advice`].
use std::{collections::HashMap, sync::Arc};

use downcast_rs::{DowncastSync, impl_downcast};
use log::{debug, info};
use parking_lot::RwLock;

use crate::{
    base::{
        context::Context,
        value::{Symbol, Value},
    },
    functions::advice::{Advice, Proceed},
    utils::error::{ErrorKind, ReteError, ReteResult},
};

pub mod advice;
pub mod builtins;

/// A function callable from test criteria.
///
/// Arguments are passed unresolved; implementations resolve the ones they use
/// through the context, which lets `and`/`or` short-circuit.
pub trait Userfunction: DowncastSync {
    fn name(&self) -> &str;

    fn call(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value>;
}
impl_downcast!(sync Userfunction);

/// [`Userfunction`] backed by a closure.
pub struct FnFunction<F> {
    name: Symbol,
    f: F,
}

impl<F> FnFunction<F>
where
    F: Fn(&[Value], &Context<'_>) -> ReteResult<Value> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Symbol>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Userfunction for FnFunction<F>
where
    F: Fn(&[Value], &Context<'_>) -> ReteResult<Value> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        (self.f)(args, cx)
    }
}

/// One layer of a function's implementation stack.
#[derive(Clone)]
pub enum Callable {
    Plain(Arc<dyn Userfunction>),
    Wrapping {
        advice: Arc<dyn Advice>,
        inner: Arc<Callable>,
    },
}

impl Callable {
    /// Innermost plain callable. Pure; nothing is unwrapped in place.
    pub fn strip(&self) -> &Callable {
        let mut current = self;
        while let Callable::Wrapping { inner, .. } = current {
            current = inner;
        }
        current
    }

    /// The plain function at the bottom of the stack.
    pub fn base(&self) -> &Arc<dyn Userfunction> {
        let mut current = self;
        loop {
            match current {
                Callable::Plain(f) => return f,
                Callable::Wrapping { inner, .. } => current = inner,
            }
        }
    }

    /// Number of advice layers above the plain function.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Callable::Wrapping { inner, .. } = current {
            depth += 1;
            current = inner;
        }
        depth
    }

    pub fn is_advised(&self) -> bool {
        matches!(self, Callable::Wrapping { .. })
    }

    /// Run this layer. A wrapper runs its advice in a frame with the
    /// interception flag raised, handing it a [`Proceed`] to the inner layer.
    pub fn invoke(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        match self {
            Callable::Plain(f) => f.call(args, cx),
            Callable::Wrapping { advice, inner } => {
                let advised = cx.inside_advice();
                advice.around(Proceed::new(inner), args, &advised)
            }
        }
    }

    /// Same stack of advice on top of a different plain function.
    fn rebase(&self, function: Arc<dyn Userfunction>) -> Callable {
        match self {
            Callable::Plain(_) => Callable::Plain(function),
            Callable::Wrapping { advice, inner } => Callable::Wrapping {
                advice: advice.clone(),
                inner: Arc::new(inner.rebase(function)),
            },
        }
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Plain(function) => write!(f, "Plain({})", function.name()),
            Callable::Wrapping { advice, inner } => {
                write!(f, "Wrapping({}, {:?})", advice.name(), inner)
            }
        }
    }
}

/// Name-to-implementation cell.
pub struct FunctionHolder {
    name: Symbol,
    current: RwLock<Option<Arc<Callable>>>,
}

impl FunctionHolder {
    fn new(name: Symbol) -> Self {
        Self {
            name,
            current: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    /// Top of the implementation stack.
    pub fn current(&self) -> Option<Arc<Callable>> {
        self.current.read().clone()
    }

    pub fn is_defined(&self) -> bool {
        self.current.read().is_some()
    }

    /// Dispatch a call.
    ///
    /// From inside an advice layer the stack is stripped down to the plain
    /// function, so advice re-entering its own function by name never runs
    /// advice again. Otherwise the top of the stack runs.
    pub fn invoke(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        let callable = self
            .current()
            .ok_or_else(|| ReteError::new(ErrorKind::UndefinedFunction(self.name.to_string())))?;

        if cx.in_advice() {
            callable.strip().invoke(args, cx)
        } else {
            callable.invoke(args, cx)
        }
    }

    fn replace(&self, callable: Callable) {
        *self.current.write() = Some(Arc::new(callable));
    }
}

impl std::fmt::Debug for FunctionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionHolder")
            .field("name", &self.name)
            .field("current", &self.current())
            .finish()
    }
}

/// Engine-wide map of function holders.
#[derive(Default)]
pub struct FunctionRegistry {
    holders: RwLock<HashMap<Symbol, Arc<FunctionHolder>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holder for `name`, created empty if the name was never referenced.
    pub fn holder(&self, name: &str) -> Arc<FunctionHolder> {
        if let Some(holder) = self.holders.read().get(name) {
            return holder.clone();
        }
        self.holders
            .write()
            .entry(Symbol::from(name))
            .or_insert_with_key(|key| Arc::new(FunctionHolder::new(key.clone())))
            .clone()
    }

    /// Bind `function` to its name. A redefinition keeps the advice already
    /// stacked on the name and swaps the function underneath it.
    pub fn define(&self, function: impl Userfunction) -> Arc<FunctionHolder> {
        self.define_arc(Arc::new(function))
    }

    pub fn define_arc(&self, function: Arc<dyn Userfunction>) -> Arc<FunctionHolder> {
        let holder = self.holder(function.name());
        let callable = match holder.current() {
            Some(previous) => {
                info!(
                    "Redefining function `{}` ({} advice layer(s) kept)",
                    holder.name(),
                    previous.depth()
                );
                previous.rebase(function)
            }
            None => {
                debug!("Defined function `{}`", holder.name());
                Callable::Plain(function)
            }
        };
        holder.replace(callable);
        holder
    }

    /// Convenience for closure-backed functions.
    pub fn define_fn<F>(&self, name: &str, f: F) -> Arc<FunctionHolder>
    where
        F: Fn(&[Value], &Context<'_>) -> ReteResult<Value> + Send + Sync + 'static,
    {
        self.define(FnFunction::new(name, f))
    }

    /// Push an advice layer on top of the named function.
    pub fn advise(&self, name: &str, advice: Arc<dyn Advice>) -> ReteResult<()> {
        let holder = self.holder(name);
        let current = holder
            .current()
            .ok_or_else(|| ReteError::new(ErrorKind::UndefinedFunction(name.to_string())))?;
        debug!("Advising function `{}` with `{}`", name, advice.name());
        holder.replace(Callable::Wrapping {
            advice,
            inner: current,
        });
        Ok(())
    }

    /// Remove every advice layer from the named function.
    pub fn unadvise(&self, name: &str) -> ReteResult<()> {
        let holder = self.holder(name);
        let current = holder
            .current()
            .ok_or_else(|| ReteError::new(ErrorKind::UndefinedFunction(name.to_string())))?;
        holder.replace(current.strip().clone());
        Ok(())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.holders
            .read()
            .get(name)
            .is_some_and(|h| h.is_defined())
    }

    /// Names with an implementation, sorted.
    pub fn names(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self
            .holders
            .read()
            .values()
            .filter(|h| h.is_defined())
            .map(|h| h.name().clone())
            .collect();
        names.sort();
        names
    }
}
