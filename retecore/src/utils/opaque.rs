use downcast_rs::{DowncastSync, impl_downcast};

/// Host object carried by an external-handle value.
///
/// The matcher never looks inside; it only compares handles by identity. Hosts
/// recover their concrete type through the `downcast_*` helpers.
pub trait OpaqueObject: DowncastSync + std::fmt::Debug {}
impl_downcast!(sync OpaqueObject);

impl<T: std::any::Any + Send + Sync + std::fmt::Debug> OpaqueObject for T {}
