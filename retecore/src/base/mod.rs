use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::debug;
use parking_lot::RwLock;

use crate::{
    accel::{Accelerator, Compilation},
    base::{
        fact::{Fact, TemplateRegistry},
        value::{FactId, FunCall, Value},
    },
    events::EventBus,
    functions::{FunctionRegistry, builtins},
    utils::{conf::EngineConfig, error::ReteResult},
};

pub mod context;
pub mod fact;
pub mod token;
pub mod value;

/// Engine-wide state shared by every node of a network.
///
/// Holds the registries consulted while matching (templates and functions),
/// the event bus, the optional accelerator and the cooperative cancellation flag.
pub struct Engine {
    config: EngineConfig,
    templates: TemplateRegistry,
    functions: FunctionRegistry,
    events: EventBus,
    accelerator: RwLock<Option<Arc<dyn Accelerator>>>,
    cancelled: Arc<AtomicBool>,
    next_fact_id: AtomicU64,
}

impl Engine {
    /// Create an engine with the builtin functions registered.
    pub fn new(config: EngineConfig) -> Self {
        let engine = Self {
            config,
            templates: TemplateRegistry::new(),
            functions: FunctionRegistry::new(),
            events: EventBus::new(),
            accelerator: RwLock::new(None),
            cancelled: Arc::new(AtomicBool::new(false)),
            next_fact_id: AtomicU64::new(1),
        };
        builtins::register_all(&engine.functions);
        debug!("Created engine with configuration {:?}", engine.config);
        engine
    }

    /// Create an engine configured from [`EngineConfig::load_or_default`].
    pub fn from_environment() -> ReteResult<Self> {
        Ok(Self::new(EngineConfig::load_or_default()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Build a fact of the named template and assign it a fresh id.
    pub fn make_fact(&self, template: &str, slots: Vec<Value>) -> ReteResult<Fact> {
        let template = self.templates.require(template)?;
        Ok(Fact::new(template, slots)?.with_id(self.next_id()))
    }

    /// Named-slot variant of [`Self::make_fact`].
    pub fn make_named_fact<'a>(
        &self,
        template: &str,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> ReteResult<Fact> {
        let template = self.templates.require(template)?;
        Ok(Fact::from_named(template, pairs)?.with_id(self.next_id()))
    }

    fn next_id(&self) -> FactId {
        FactId(self.next_fact_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn set_accelerator(&self, accelerator: Arc<dyn Accelerator>) {
        debug!("Registered accelerator `{}`", accelerator.name());
        *self.accelerator.write() = Some(accelerator);
    }

    pub fn clear_accelerator(&self) {
        *self.accelerator.write() = None;
    }

    pub fn accelerator(&self) -> Option<Arc<dyn Accelerator>> {
        self.accelerator.read().clone()
    }

    /// Ask the registered accelerator, if any and if enabled, to compile `call`.
    pub fn compile(&self, call: &FunCall) -> Compilation {
        if !self.config.use_accelerator {
            return Compilation::Unavailable("acceleration disabled".to_string());
        }
        match self.accelerator() {
            Some(accelerator) => accelerator.compile(call, self),
            None => Compilation::Unavailable("no accelerator registered".to_string()),
        }
    }

    /// Shared flag; raising it makes the next node visit fail with
    /// [`crate::utils::error::ErrorKind::Cancelled`].
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
