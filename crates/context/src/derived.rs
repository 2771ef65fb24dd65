//! Contexts computed from other contexts.
//!
//! A [`DerivedProvider`] consumes every base context from its own host and
//! republishes a value computed from them. It stays at its initial value
//! until each base has a provider, recomputes whenever any base delivers a
//! value, and falls back to its initial value as soon as one base loses its
//! provider.

use crate::consumer::Consumer;
use crate::context::Context;
use crate::provider::{Provider, ProviderInner};
use dom::{ContextId, DocumentRef, NodeId};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A context usable as the input of a derived context.
pub trait BaseContext: Send + Sync {
    fn id(&self) -> ContextId;

    fn consume_erased(&self, doc: &DocumentRef, host: NodeId) -> Box<dyn ErasedConsumer>;
}

/// A consumer with its value type erased.
pub trait ErasedConsumer: Send + Sync {
    fn context_id(&self) -> ContextId;

    fn is_registered(&self) -> bool;

    fn value_any(&self) -> Box<dyn Any + Send>;

    fn subscribe_any(&self, callback: Arc<dyn Fn() + Send + Sync>) -> u64;
}

impl<T: Clone + Send + Sync + 'static> BaseContext for Context<T> {
    fn id(&self) -> ContextId {
        Context::id(self)
    }

    fn consume_erased(&self, doc: &DocumentRef, host: NodeId) -> Box<dyn ErasedConsumer> {
        Box::new(self.consume(doc, host))
    }
}

impl<T: Clone + Send + Sync + 'static> ErasedConsumer for Consumer<T> {
    fn context_id(&self) -> ContextId {
        Consumer::context_id(self)
    }

    fn is_registered(&self) -> bool {
        Consumer::is_registered(self)
    }

    fn value_any(&self) -> Box<dyn Any + Send> {
        Box::new(self.value())
    }

    fn subscribe_any(&self, callback: Arc<dyn Fn() + Send + Sync>) -> u64 {
        self.subscribe(move |_| callback())
    }
}

/// Snapshot of base values handed to the derive function.
pub struct DerivedValues {
    values: HashMap<ContextId, Box<dyn Any + Send>>,
}

impl DerivedValues {
    /// Value of a base context, if it is one of the bases.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, context: &Context<T>) -> Option<T> {
        self.values
            .get(&context.id())?
            .downcast_ref::<T>()
            .cloned()
    }
}

type DeriveFn<T> = Arc<dyn Fn(&DerivedValues) -> T + Send + Sync>;

/// A context whose value is derived from base contexts.
///
/// Only `provide` and `consume` are exposed; the value cannot be set from
/// outside.
pub struct DerivedContext<T> {
    context: Context<T>,
    bases: Vec<Arc<dyn BaseContext>>,
    derive: DeriveFn<T>,
}

impl<T: Clone + Send + Sync + 'static> DerivedContext<T> {
    pub fn new(
        init: impl Fn() -> T + Send + Sync + 'static,
        bases: Vec<Arc<dyn BaseContext>>,
        derive: impl Fn(&DerivedValues) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: Context::new(init),
            bases,
            derive: Arc::new(derive),
        }
    }

    pub fn id(&self) -> ContextId {
        self.context.id()
    }

    pub fn initial_value(&self) -> T {
        self.context.initial_value()
    }

    pub fn consume(&self, doc: &DocumentRef, host: NodeId) -> Consumer<T> {
        self.context.consume(doc, host)
    }

    pub fn provide(&self, doc: &DocumentRef, host: NodeId) -> DerivedProvider<T> {
        DerivedProvider::attach(self, doc, host)
    }
}

impl<T> std::fmt::Debug for DerivedContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedContext")
            .field("context", &self.context)
            .field("bases", &self.bases.len())
            .finish()
    }
}

struct DerivedState<T> {
    provider: Weak<ProviderInner<T>>,
    bases: RwLock<Vec<Box<dyn ErasedConsumer>>>,
    expected: usize,
    derive: DeriveFn<T>,
    emitting: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> DerivedState<T> {
    fn recompute(&self) {
        let Some(provider) = self.provider.upgrade() else {
            return;
        };

        let values = {
            let bases = self.bases.read();
            if bases.len() != self.expected {
                return;
            }
            if bases.iter().all(|base| base.is_registered()) {
                Some(DerivedValues {
                    values: bases
                        .iter()
                        .map(|base| (base.context_id(), base.value_any()))
                        .collect(),
                })
            } else {
                None
            }
        };

        match values {
            Some(values) => {
                let value = (self.derive)(&values);
                self.emitting.store(true, Ordering::SeqCst);
                provider.set_value(value);
            }
            None => {
                if self.emitting.swap(false, Ordering::SeqCst) {
                    tracing::debug!("base context lost its provider, resetting derived value");
                    provider.reset();
                }
            }
        }
    }
}

/// Provider half of a [`DerivedContext`].
pub struct DerivedProvider<T: Clone + Send + Sync + 'static> {
    state: Arc<DerivedState<T>>,
    // Declared last so the base consumers are gone before the provider
    // releases its own consumers.
    provider: Provider<T>,
}

impl<T: Clone + Send + Sync + 'static> DerivedProvider<T> {
    fn attach(derived: &DerivedContext<T>, doc: &DocumentRef, host: NodeId) -> Self {
        let provider = derived.context.provide(doc, host);
        let state = Arc::new(DerivedState {
            provider: provider.downgrade(),
            bases: RwLock::new(Vec::new()),
            expected: derived.bases.len(),
            derive: derived.derive.clone(),
            emitting: AtomicBool::new(false),
        });

        let bases: Vec<Box<dyn ErasedConsumer>> = derived
            .bases
            .iter()
            .map(|base| base.consume_erased(doc, host))
            .collect();
        for base in &bases {
            let weak = Arc::downgrade(&state);
            base.subscribe_any(Arc::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.recompute();
                }
            }));
        }
        *state.bases.write() = bases;
        state.recompute();

        Self { state, provider }
    }

    /// Current derived value.
    pub fn value(&self) -> T {
        self.provider.value()
    }

    /// Whether every base currently has a provider.
    pub fn is_ready(&self) -> bool {
        self.state.bases.read().iter().all(|base| base.is_registered())
    }

    pub fn host(&self) -> NodeId {
        self.provider.host()
    }

    pub fn consumer_count(&self) -> usize {
        self.provider.consumer_count()
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for DerivedProvider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedProvider")
            .field("provider", &self.provider)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::Document;
    use parking_lot::Mutex;

    struct Fixture {
        doc: DocumentRef,
        player: NodeId,
        wrapper: NodeId,
        display: NodeId,
    }

    // root > player > wrapper > display
    fn fixture() -> Fixture {
        let doc = Document::new();
        let player = doc.create_element("media-player");
        let wrapper = doc.create_element("media-controls");
        let display = doc.create_element("media-time-display");
        doc.append_child(doc.root(), player).unwrap();
        doc.append_child(player, wrapper).unwrap();
        doc.append_child(wrapper, display).unwrap();
        Fixture {
            doc,
            player,
            wrapper,
            display,
        }
    }

    fn remaining_time() -> (Context<f64>, Context<f64>, DerivedContext<f64>) {
        let current = Context::new(|| 0.0);
        let duration = Context::new(|| 0.0);
        let derived = DerivedContext::new(
            || -1.0,
            vec![
                Arc::new(current.clone()) as Arc<dyn BaseContext>,
                Arc::new(duration.clone()) as Arc<dyn BaseContext>,
            ],
            {
                let current = current.clone();
                let duration = duration.clone();
                move |values: &DerivedValues| {
                    let current = values.get(&current).unwrap_or_default();
                    let duration = values.get(&duration).unwrap_or_default();
                    duration - current
                }
            },
        );
        (current, duration, derived)
    }

    #[test]
    fn test_waits_for_every_base() {
        let f = fixture();
        let (current, duration, derived) = remaining_time();

        let current_provider = current.provide(&f.doc, f.player);
        current_provider.set_value(10.0);

        let remaining = derived.provide(&f.doc, f.wrapper);
        let consumer = derived.consume(&f.doc, f.display);
        assert!(!remaining.is_ready());
        assert_eq!(consumer.value(), -1.0);

        // The second base provider mounts after the derived one.
        let duration_provider = duration.provide(&f.doc, f.player);
        duration_provider.set_value(60.0);

        assert!(remaining.is_ready());
        assert_eq!(consumer.value(), 50.0);
    }

    #[test]
    fn test_recomputes_on_base_change() {
        let f = fixture();
        let (current, duration, derived) = remaining_time();
        let current_provider = current.provide(&f.doc, f.player);
        let duration_provider = duration.provide(&f.doc, f.player);
        duration_provider.set_value(100.0);

        let remaining = derived.provide(&f.doc, f.wrapper);
        let consumer = derived.consume(&f.doc, f.display);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        consumer.subscribe(move |v| record.lock().push(*v));

        current_provider.set_value(25.0);
        current_provider.set_value(40.0);

        assert_eq!(*seen.lock(), vec![75.0, 60.0]);
        assert_eq!(remaining.value(), 60.0);
    }

    #[test]
    fn test_resets_when_base_provider_leaves() {
        let f = fixture();
        let (current, duration, derived) = remaining_time();

        let current_host = f.doc.create_element("media-clock");
        f.doc.append_child(f.doc.root(), current_host).unwrap();
        // Move the player under the clock so both bases sit above it.
        f.doc.append_child(current_host, f.player).unwrap();
        let current_provider = current.provide(&f.doc, current_host);
        let duration_provider = duration.provide(&f.doc, f.player);
        current_provider.set_value(1.0);
        duration_provider.set_value(3.0);

        let remaining = derived.provide(&f.doc, f.wrapper);
        assert_eq!(remaining.value(), 2.0);

        drop(duration_provider);
        assert!(!remaining.is_ready());
        assert_eq!(remaining.value(), -1.0);
        drop(current_provider);
    }

    #[test]
    fn test_derived_with_no_bases_computes_once() {
        let f = fixture();
        let derived: DerivedContext<&'static str> =
            DerivedContext::new(|| "initial", Vec::new(), |_| "derived");
        let provider = derived.provide(&f.doc, f.player);
        let consumer = derived.consume(&f.doc, f.display);
        assert_eq!(provider.value(), "derived");
        assert_eq!(consumer.value(), "derived");
    }
}
