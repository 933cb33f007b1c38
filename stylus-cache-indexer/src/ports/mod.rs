//! Port traits decoupling the pipeline from concrete infrastructure.

mod store;

pub use store::{ChainStore, DerivedStateStore, EventStore, StateStore};

/// Convenience bound for a store implementing every persistence port.
pub trait FullStore: ChainStore + EventStore + StateStore + DerivedStateStore {}

impl<T> FullStore for T where T: ChainStore + EventStore + StateStore + DerivedStateStore {}
