//! Context identity.

use crate::consumer::Consumer;
use crate::provider::Provider;
use dom::{ContextId, DocumentRef, NodeId};
use std::sync::Arc;

/// A context: a process-unique id plus a factory for its initial value.
///
/// Cloning a context keeps its identity, so clones pair with each other.
pub struct Context<T> {
    id: ContextId,
    init: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: Clone + Send + Sync + 'static> Context<T> {
    /// Create a context with a fresh id.
    pub fn new(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            id: ContextId::next(),
            init: Arc::new(init),
        }
    }

    /// Create a context whose initial value is a clone of `value`.
    pub fn with_value(value: T) -> Self {
        Self::new(move || value.clone())
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// A fresh copy of the initial value.
    pub fn initial_value(&self) -> T {
        (self.init)()
    }

    pub(crate) fn factory(&self) -> Arc<dyn Fn() -> T + Send + Sync> {
        self.init.clone()
    }

    /// Provide this context on `host`.
    pub fn provide(&self, doc: &DocumentRef, host: NodeId) -> Provider<T> {
        Provider::attach(self, doc, host)
    }

    /// Consume this context from `host`.
    pub fn consume(&self, doc: &DocumentRef, host: NodeId) -> Consumer<T> {
        Consumer::attach(self, doc, host)
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            init: self.init.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
