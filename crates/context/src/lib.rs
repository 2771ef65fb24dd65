//! Discovery and context propagation.
//!
//! Providers own a value on a host node; consumers find the nearest
//! provider of the same [`Context`] above them by dispatching a discovery
//! event that bubbles up the component tree. Consumers that mount before
//! their provider wait in the document's [`OrphanRegistry`] and are adopted
//! when a provider connects above them.

pub mod consumer;
pub mod context;
pub mod derived;
pub mod orphans;
pub mod provider;

pub use consumer::Consumer;
pub use context::Context;
pub use derived::{BaseContext, DerivedContext, DerivedProvider, DerivedValues, ErasedConsumer};
pub use orphans::{OrphanEntry, OrphanRegistry};
pub use provider::Provider;
