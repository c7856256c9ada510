//! Facts and templates
//!
//! A [`Template`] is a named slot schema with at most one parent. Templates are
//! immutable once built and hold their parent by [`Arc`], and the
//! [`TemplateRegistry`] only accepts a parent that is already registered, so the
//! template tree cannot contain a cycle. Ancestor walks are still guarded by a
//! depth limit.
use std::{
    collections::BTreeMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use log::debug;
use parking_lot::RwLock;

use crate::{
    base::value::{FactId, Symbol, Value},
    utils::error::{ErrorKind, ReteError, ReteResult},
};

#[derive(Debug)]
pub struct Template {
    name: Symbol,
    parent: Option<Arc<Template>>,
    slots: Vec<Symbol>,
}

impl Template {
    /// Build a template. Slots of the parent come first, followed by the
    /// template's own slots not already inherited.
    pub fn new(
        name: impl Into<Symbol>,
        parent: Option<Arc<Template>>,
        own_slots: impl IntoIterator<Item = Symbol>,
    ) -> Self {
        let mut slots: Vec<Symbol> = parent
            .as_ref()
            .map(|p| p.slots.clone())
            .unwrap_or_default();
        for slot in own_slots {
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }

        Self {
            name: name.into(),
            parent,
            slots,
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Template>> {
        self.parent.as_ref()
    }

    pub fn slots(&self) -> &[Symbol] {
        &self.slots
    }

    pub fn slot_index(&self, slot: &str) -> Option<usize> {
        self.slots.iter().position(|s| &**s == slot)
    }

    /// Ancestors of this template, closest first. Does not include `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = &Template> {
        std::iter::successors(self.parent.as_deref(), |t| t.parent.as_deref())
    }

    /// `true` iff this template or one of its ancestors is named `target`.
    ///
    /// The walk stops at the first match or at the root. Chains longer than
    /// `max_depth` are reported as [`ErrorKind::TemplateTooDeep`].
    pub fn is_a(&self, target: &str, max_depth: usize) -> ReteResult<bool> {
        let mut current = Some(self);
        let mut depth = 0usize;
        while let Some(template) = current {
            if &*template.name == target {
                return Ok(true);
            }
            if depth >= max_depth && template.parent.is_some() {
                return Err(ReteError::new(ErrorKind::TemplateTooDeep {
                    template: self.name.to_string(),
                    max: max_depth,
                }));
            }
            depth += 1;
            current = template.parent.as_deref();
        }
        Ok(false)
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(parent) = &self.parent {
            write!(f, " extends {}", parent.name)?;
        }
        Ok(())
    }
}

/// Name-keyed store of templates.
///
/// Definitions happen between matching passes; lookups during a pass only take
/// the read lock.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<BTreeMap<Symbol, Arc<Template>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template. The parent, when given, must already be registered.
    pub fn define(
        &self,
        name: &str,
        parent: Option<&str>,
        slots: &[&str],
    ) -> ReteResult<Arc<Template>> {
        let mut templates = self.templates.write();
        if templates.contains_key(name) {
            return Err(ReteError::new(ErrorKind::DuplicateTemplate(name.to_string())));
        }

        let parent = match parent {
            Some(parent_name) => Some(
                templates
                    .get(parent_name)
                    .cloned()
                    .ok_or_else(|| ErrorKind::UndefinedTemplate(parent_name.to_string()))?,
            ),
            None => None,
        };

        let template = Arc::new(Template::new(
            name,
            parent,
            slots.iter().map(|s| Symbol::from(*s)),
        ));
        debug!("Defined template {} with slots {:?}", template, template.slots());
        templates.insert(template.name.clone(), template.clone());
        Ok(template)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> ReteResult<Arc<Template>> {
        self.get(name)
            .ok_or_else(|| ReteError::new(ErrorKind::UndefinedTemplate(name.to_string())))
    }

    /// `true` iff `child` is `ancestor` or inherits from it.
    pub fn is_a(&self, child: &str, ancestor: &str, max_depth: usize) -> ReteResult<bool> {
        self.require(child)?.is_a(ancestor, max_depth)
    }

    pub fn names(&self) -> Vec<Symbol> {
        self.templates.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered slot record conforming to a template.
#[derive(Debug, Clone)]
pub struct Fact {
    id: FactId,
    template: Arc<Template>,
    slots: Box<[Value]>,
}

impl Fact {
    /// Build a fact by slot position.
    ///
    /// Templates without declared slots (ordered facts) accept any number of
    /// values; otherwise the count must match.
    pub fn new(template: Arc<Template>, slots: Vec<Value>) -> ReteResult<Self> {
        let declared = template.slots().len();
        if declared != 0 && declared != slots.len() {
            return Err(ReteError::new(ErrorKind::SlotCount {
                template: template.name().to_string(),
                expected: declared,
                found: slots.len(),
            }));
        }

        Ok(Self {
            id: FactId::NONE,
            template,
            slots: slots.into_boxed_slice(),
        })
    }

    /// Build a fact from `(slot name, value)` pairs. Missing slots default to `nil`.
    pub fn from_named<'a>(
        template: Arc<Template>,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> ReteResult<Self> {
        let mut slots = vec![Value::nil(); template.slots().len()];
        for (name, value) in pairs {
            let index = template.slot_index(name).ok_or_else(|| {
                ReteError::new(ErrorKind::UnknownSlot {
                    template: template.name().to_string(),
                    slot: name.to_string(),
                })
            })?;
            slots[index] = value;
        }
        Self::new(template, slots)
    }

    pub fn with_id(mut self, id: FactId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn name(&self) -> &Symbol {
        self.template.name()
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> ReteResult<&Value> {
        self.slots.get(index).ok_or_else(|| {
            ReteError::new(ErrorKind::SlotOutOfRange {
                template: self.template.name().to_string(),
                slot: index,
                len: self.slots.len(),
            })
        })
    }

    pub fn named_slot(&self, name: &str) -> ReteResult<&Value> {
        let index = self.template.slot_index(name).ok_or_else(|| {
            ReteError::new(ErrorKind::UnknownSlot {
                template: self.template.name().to_string(),
                slot: name.to_string(),
            })
        })?;
        self.slot(index)
    }
}

/// Data equality: template name and slot values. The id does not take part.
impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.template.name() == other.template.name() && self.slots == other.slots
    }
}

impl Eq for Fact {}

impl Hash for Fact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.template.name().hash(state);
        self.slots.hash(state);
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}", self.template.name())?;
        let names = self.template.slots();
        for (i, value) in self.slots.iter().enumerate() {
            match names.get(i) {
                Some(name) => write!(f, " ({} {})", name, value)?,
                None => write!(f, " {}", value)?,
            }
        }
        write!(f, ")")
    }
}
