//! Node memories.
//!
//! [`TokenVector`] is the compact, unsynchronised token sequence kept by
//! terminal memories. Removal swaps the last element into the freed position,
//! so order is only meaningful between removals.
use std::cell::{Ref, RefCell};

use downcast_rs::{Downcast, impl_downcast};
use log::trace;

use crate::{
    base::{
        Engine,
        token::{Token, TokenTag},
    },
    events::Direction,
    utils::error::ReteResult,
};

#[derive(Debug, Clone, Default)]
pub struct TokenVector {
    tokens: Vec<Token>,
}

impl TokenVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Position of the first token data-equal to `token`.
    pub fn position(&self, token: &Token) -> Option<usize> {
        self.tokens.iter().position(|t| t.data_equals(token))
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.position(token).is_some()
    }

    /// Remove the element at `index`, moving the last element into its place.
    pub fn remove_at(&mut self, index: usize) -> Option<Token> {
        (index < self.tokens.len()).then(|| self.tokens.swap_remove(index))
    }

    /// Remove the first token data-equal to `token`.
    pub fn remove(&mut self, token: &Token) -> Option<Token> {
        let index = self.position(token)?;
        self.remove_at(index)
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }
}

impl<'a> IntoIterator for &'a TokenVector {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Token> for TokenVector {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Receiver of the tokens leaving the single-input network.
pub trait TokenSink: Downcast {
    fn name(&self) -> &str;

    fn accept(&self, direction: Direction, token: &Token, engine: &Engine) -> ReteResult<()>;
}
impl_downcast!(TokenSink);

/// Sink remembering the tokens it currently holds.
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    tokens: RefCell<TokenVector>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            tokens: RefCell::new(TokenVector::with_capacity(capacity)),
        }
    }

    /// Memory sized from the engine configuration.
    pub fn for_engine(name: impl Into<String>, engine: &Engine) -> Self {
        Self::new(name, engine.config().memory_capacity)
    }

    pub fn tokens(&self) -> Ref<'_, TokenVector> {
        self.tokens.borrow()
    }

    pub fn len(&self) -> usize {
        self.tokens.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.borrow().is_empty()
    }
}

impl TokenSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, direction: Direction, token: &Token, _engine: &Engine) -> ReteResult<()> {
        let mut tokens = self.tokens.borrow_mut();
        match token.tag() {
            TokenTag::Normal => tokens.push(token.with_tag(TokenTag::Normal)),
            TokenTag::Retract => {
                if tokens.remove(token).is_none() {
                    trace!("{}: retracted {} was not held", self.name, token);
                }
            }
            TokenTag::Flush => tokens.clear(),
        }
        trace!("{} from the {}: {} token(s) held", self.name, direction, tokens.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::base::value::Value;

    fn tokens(engine: &Engine, n: i32) -> Vec<Token> {
        engine.templates().define("n", None, &["v"]).unwrap();
        (0..n)
            .map(|i| {
                let fact = engine.make_fact("n", vec![Value::Integer(i)]).unwrap();
                Token::new(Arc::new(fact), TokenTag::Normal)
            })
            .collect()
    }

    #[test]
    fn removal_swaps_the_last_element_in() {
        let engine = Engine::default();
        let all = tokens(&engine, 4);
        let mut vector: TokenVector = all.iter().cloned().collect();

        assert_eq!(vector.remove(&all[1]).as_ref(), Some(&all[1]));
        assert_eq!(vector.as_slice(), [all[0].clone(), all[3].clone(), all[2].clone()]);
        assert!(vector.remove(&all[1]).is_none());
        assert!(vector.remove_at(3).is_none());
        assert_eq!(vector.remove_at(2).as_ref(), Some(&all[2]));
        assert_eq!(vector.len(), 2);
    }

    #[test]
    fn memory_follows_token_tags() {
        let engine = Engine::default();
        let all = tokens(&engine, 3);
        let sink = MemorySink::for_engine("memory", &engine);

        for token in &all {
            sink.accept(Direction::Right, token, &engine).unwrap();
        }
        let retract = all[0].with_tag(TokenTag::Retract);
        sink.accept(Direction::Right, &retract, &engine).unwrap();
        assert_eq!(sink.len(), 2);
        assert!(!sink.tokens().contains(&all[0]));
        assert!(sink.tokens().iter().all(|t| t.tag().is_normal()));

        sink.accept(Direction::Left, &Token::flush(), &engine).unwrap();
        assert!(sink.is_empty());
    }
}
