//! Single-input matching core of a forward-chaining production-rule engine.
//!
//! Facts enter a [`network::Network`] as single-fact tokens, run through a
//! chain of single-input tests (template, slot equality, list length) and reach
//! sinks handing them to the join stage. The crate also carries what those
//! tests evaluate against: the [`base::value::Value`] model, rebinding of
//! engine functions with advice ([`functions`]), event broadcast at node entry
//! ([`events`]) and an optional compiled path for call criteria ([`accel`]).
//! Most consumers start from [`base::Engine`] and [`network::Network`].

pub mod accel;
pub mod base;
pub mod events;
pub mod functions;
pub mod magic;
pub mod network;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;
pub mod utils;

pub use base::Engine;
pub use utils::error::{ErrorKind, ReteError, ReteResult};
