//! Direction adapters used to build negated sub-patterns.
//!
//! Adapters hold no state; their routing is done by
//! [`crate::network::Network::call_left`] and
//! [`crate::network::Network::call_right`].

/// Accepts `call_left`, forwards through `call_right`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeftToRight;

/// Accepts `call_right`, forwards through `call_left`. A flush is relayed to
/// the right like any other single-input vertex.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RightToLeft;

impl std::fmt::Display for LeftToRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[LeftToRight]")
    }
}

impl std::fmt::Display for RightToLeft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[RightToLeft]")
    }
}
