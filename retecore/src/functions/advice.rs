//! Advice
//!
//! Advice wraps a function at runtime to add behaviour around its invocation.
//! Layers stack: each [`Advice`] receives a [`Proceed`] handle to the layer below
//! and decides whether, when and with which arguments to call through.
//!
//! Advice bodies run with the context's interception flag raised. A call that
//! reaches a [`super::FunctionHolder`] under that flag is dispatched to the plain
//! function, never to a wrapper, so advice calling its own function by name
//! cannot recurse into itself.
use std::sync::Arc;

use crate::{
    base::{
        context::Context,
        value::{Symbol, Value},
    },
    functions::Callable,
    utils::error::ReteResult,
};

pub trait Advice: Send + Sync {
    fn name(&self) -> &str;

    fn around(&self, proceed: Proceed<'_>, args: &[Value], cx: &Context<'_>) -> ReteResult<Value>;
}

/// Handle to the layer below an advice.
#[derive(Clone, Copy)]
pub struct Proceed<'a> {
    inner: &'a Arc<Callable>,
}

impl<'a> Proceed<'a> {
    pub(crate) fn new(inner: &'a Arc<Callable>) -> Self {
        Self { inner }
    }

    /// Call through to the next layer.
    pub fn call(&self, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        self.inner.invoke(args, cx)
    }

    pub fn callable(&self) -> &'a Arc<Callable> {
        self.inner
    }
}

/// [`Advice`] backed by a closure.
pub struct FnAdvice<F> {
    name: Symbol,
    f: F,
}

impl<F> FnAdvice<F>
where
    F: Fn(Proceed<'_>, &[Value], &Context<'_>) -> ReteResult<Value> + Send + Sync,
{
    pub fn new(name: impl Into<Symbol>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Advice for FnAdvice<F>
where
    F: Fn(Proceed<'_>, &[Value], &Context<'_>) -> ReteResult<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn around(&self, proceed: Proceed<'_>, args: &[Value], cx: &Context<'_>) -> ReteResult<Value> {
        (self.f)(proceed, args, cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    use super::*;
    use crate::base::Engine;

    fn counting_base(engine: &Engine, calls: Arc<AtomicUsize>) {
        engine.functions().define_fn("base", move |args, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Integer(args.len() as i32))
        });
    }

    fn logging_layer(label: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Advice> {
        Arc::new(FnAdvice::new(label, move |proceed, args, cx| {
            log.lock().push(label);
            proceed.call(args, cx)
        }))
    }

    #[test]
    fn flagged_context_dispatches_base_once_through_three_layers() {
        let engine = Engine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        counting_base(&engine, calls.clone());
        for label in ["one", "two", "three"] {
            engine
                .functions()
                .advise("base", logging_layer(label, log.clone()))
                .unwrap();
        }

        let holder = engine.functions().holder("base");
        assert_eq!(holder.current().unwrap().depth(), 3);

        let cx = Context::new(&engine).inside_advice();
        holder.invoke(&[Value::nil()], &cx).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn clear_flag_runs_every_layer_outermost_first() {
        let engine = Engine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        counting_base(&engine, calls.clone());
        for label in ["one", "two", "three"] {
            engine
                .functions()
                .advise("base", logging_layer(label, log.clone()))
                .unwrap();
        }

        let result = engine
            .functions()
            .holder("base")
            .invoke(&[Value::nil(), Value::nil()], &Context::new(&engine))
            .unwrap();
        assert_eq!(result, Value::Integer(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), ["three", "two", "one"]);
    }

    #[test]
    fn advice_reentering_by_name_reaches_the_plain_function() {
        let engine = Engine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        counting_base(&engine, calls.clone());
        engine
            .functions()
            .advise(
                "base",
                Arc::new(FnAdvice::new("reenter", |_proceed, args, cx| {
                    let again = cx.engine().functions().holder("base");
                    let inner = again.invoke(args, cx)?;
                    Ok(Value::Integer(inner.int_value(None)? * 10))
                })),
            )
            .unwrap();

        let result = engine
            .functions()
            .holder("base")
            .invoke(&[Value::nil()], &Context::new(&engine))
            .unwrap();
        assert_eq!(result, Value::Integer(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unadvise_and_redefine_keep_the_holder() {
        let engine = Engine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        counting_base(&engine, calls);
        let log = Arc::new(Mutex::new(Vec::new()));
        engine
            .functions()
            .advise("base", logging_layer("outer", log.clone()))
            .unwrap();

        engine
            .functions()
            .define_fn("base", |_, _| Ok(Value::atom("replaced")));
        let holder = engine.functions().holder("base");
        assert_eq!(holder.current().unwrap().depth(), 1);
        assert_eq!(
            holder.invoke(&[], &Context::new(&engine)).unwrap(),
            Value::atom("replaced")
        );
        assert_eq!(log.lock().len(), 1);

        engine.functions().unadvise("base").unwrap();
        assert!(!holder.current().unwrap().is_advised());
        assert!(engine.functions().advise("missing", logging_layer("x", log)).is_err());
    }
}
