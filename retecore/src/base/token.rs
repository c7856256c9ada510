//! Tokens
//!
//! A [`Token`] is a persistent chain of facts. Extending a token allocates a new
//! link pointing at the shared parent chain, so every branch of a fan-out can
//! extend its own view without the others observing it. Each link caches the
//! chain length and a content hash; data equality checks those first and then
//! compares facts element-wise.
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use strum::{Display, EnumIs};

use crate::base::fact::Fact;

/// Control tag carried by a token.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIs)]
pub enum TokenTag {
    /// A new partial match.
    #[default]
    Normal,
    /// Removal of a partial match previously routed as [`TokenTag::Normal`].
    /// Tests treat it exactly as `Normal`; only memories tell them apart.
    Retract,
    /// Discard all partial-match state downstream.
    Flush,
}

#[derive(Debug)]
struct Link {
    fact: Arc<Fact>,
    parent: Option<Arc<Link>>,
    len: usize,
    hash: u64,
}

#[derive(Debug, Clone)]
pub struct Token {
    tag: TokenTag,
    head: Option<Arc<Link>>,
}

impl Token {
    /// Single-fact token.
    pub fn new(fact: Arc<Fact>, tag: TokenTag) -> Self {
        Self { tag, head: None }.extend(fact)
    }

    /// The fact-less token used to broadcast a flush.
    pub fn flush() -> Self {
        Self {
            tag: TokenTag::Flush,
            head: None,
        }
    }

    /// New token with `fact` appended. `self` is left untouched.
    pub fn extend(&self, fact: Arc<Fact>) -> Self {
        let (len, parent_hash) = match &self.head {
            Some(link) => (link.len, link.hash),
            None => (0, 0),
        };
        let mut hasher = DefaultHasher::new();
        parent_hash.hash(&mut hasher);
        fact.hash(&mut hasher);

        Self {
            tag: self.tag,
            head: Some(Arc::new(Link {
                fact,
                parent: self.head.clone(),
                len: len + 1,
                hash: hasher.finish(),
            })),
        }
    }

    /// Same chain, different tag.
    pub fn with_tag(&self, tag: TokenTag) -> Self {
        Self {
            tag,
            head: self.head.clone(),
        }
    }

    pub fn tag(&self) -> TokenTag {
        self.tag
    }

    pub fn is_flush(&self) -> bool {
        self.tag.is_flush()
    }

    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |l| l.len)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Most recently added fact.
    pub fn lead(&self) -> Option<&Arc<Fact>> {
        self.head.as_ref().map(|l| &l.fact)
    }

    /// Fact at `index`, 0 being the oldest.
    pub fn fact(&self, index: usize) -> Option<&Arc<Fact>> {
        let len = self.len();
        if index >= len {
            return None;
        }
        self.newest_first().nth(len - 1 - index)
    }

    /// Facts from the most recent to the oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &Arc<Fact>> {
        std::iter::successors(self.head.as_deref(), |l| l.parent.as_deref()).map(|l| &l.fact)
    }

    /// Facts from the oldest to the most recent.
    pub fn facts(&self) -> Vec<Arc<Fact>> {
        let mut facts: Vec<_> = self.newest_first().cloned().collect();
        facts.reverse();
        facts
    }

    pub fn content_hash(&self) -> u64 {
        self.head.as_ref().map_or(0, |l| l.hash)
    }

    /// Element-wise comparison of the fact sequences, tags ignored.
    pub fn data_equals(&self, other: &Token) -> bool {
        let mut a = self.head.as_ref();
        let mut b = other.head.as_ref();
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.len != y.len || x.hash != y.hash {
                        return false;
                    }
                    if !Arc::ptr_eq(&x.fact, &y.fact) && x.fact != y.fact {
                        return false;
                    }
                    a = x.parent.as_ref();
                    b = y.parent.as_ref();
                }
                _ => return false,
            }
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.data_equals(other)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_hash().hash(state);
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[Token: size={};tag={};facts=", self.len(), self.tag)?;
        for (i, fact) in self.facts().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", fact.id())?;
        }
        write!(f, "]")
    }
}
