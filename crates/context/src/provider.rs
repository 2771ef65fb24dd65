//! Context providers.

use crate::consumer::ConsumerSlot;
use crate::context::Context;
use crate::orphans::OrphanRegistry;
use dom::{
    ContextId, Document, DocumentRef, Event, EventDetail, EventType, LifecycleBinding,
    ListenerId, NodeId,
};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

pub(crate) struct ProviderInner<T> {
    context: ContextId,
    init: Arc<dyn Fn() -> T + Send + Sync>,
    doc: Weak<Document>,
    host: NodeId,
    value: RwLock<T>,
    consumers: Mutex<IndexMap<u64, Arc<ConsumerSlot<T>>>>,
    listener: Mutex<Option<ListenerId>>,
}

impl<T: Clone + Send + Sync + 'static> ProviderInner<T> {
    pub(crate) fn value(&self) -> T {
        self.value.read().clone()
    }

    pub(crate) fn set_value(&self, value: T) {
        *self.value.write() = value.clone();
        let consumers: Vec<_> = self.consumers.lock().values().cloned().collect();
        for consumer in consumers {
            consumer.update(value.clone());
        }
    }

    pub(crate) fn reset(&self) {
        self.set_value((self.init)());
    }

    fn connect(self: &Arc<Self>) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };

        let weak = Arc::downgrade(self);
        let listener = doc.listen(self.host, EventType::ContextRequest, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_request(event);
            }
        });
        if let Some(stale) = self.listener.lock().replace(listener) {
            doc.remove_event_listener(stale);
        }

        let host = self.host;
        let adopted = doc
            .extension::<OrphanRegistry>()
            .adopt(self.context, |node| doc.contains(host, node));
        if !adopted.is_empty() {
            tracing::debug!(context = %self.context, count = adopted.len(), "adopting orphan consumers");
        }
        for orphan in adopted {
            match orphan.sink.downcast::<ConsumerSlot<T>>() {
                Ok(slot) => self.register(slot),
                Err(_) => tracing::warn!(context = %self.context, "orphan sink has a foreign value type"),
            }
        }
    }

    fn handle_request(self: &Arc<Self>, event: &mut Event) {
        let request = match &event.detail {
            EventDetail::Context(request) if request.context == self.context => request.clone(),
            _ => return,
        };
        // Nearest provider wins: farther ancestors never see this request.
        event.stop_propagation();

        match request.sink.downcast::<ConsumerSlot<T>>() {
            Ok(slot) => self.register(slot),
            Err(_) => tracing::warn!(context = %self.context, "context request carried a foreign value type"),
        }
    }

    fn register(self: &Arc<Self>, slot: Arc<ConsumerSlot<T>>) {
        let slot_id = slot.id;
        self.consumers.lock().insert(slot_id, slot.clone());

        let weak = Arc::downgrade(self);
        let unregister = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.consumers.lock().shift_remove(&slot_id);
            }
        });

        tracing::debug!(context = %self.context, consumer = ?slot.host, "consumer paired");
        slot.pair(self.host, self.value(), unregister);
    }

    /// Host disconnected: stop answering, reset and release every consumer.
    fn disconnect(&self) {
        if let Some(listener) = self.listener.lock().take() {
            if let Some(doc) = self.doc.upgrade() {
                doc.remove_event_listener(listener);
            }
        }

        let initial = (self.init)();
        *self.value.write() = initial.clone();

        let released: Vec<_> = self.consumers.lock().drain(..).map(|(_, slot)| slot).collect();
        if !released.is_empty() {
            tracing::debug!(context = %self.context, count = released.len(), "releasing consumers");
        }
        for slot in released {
            slot.release(initial.clone());
        }
    }
}

/// Write side of a context, bound to a host node.
///
/// While the host is connected the provider answers discovery requests from
/// consumers beneath it. Dropping the provider tears it down as if its host
/// had disconnected.
pub struct Provider<T: Clone + Send + Sync + 'static> {
    inner: Arc<ProviderInner<T>>,
    binding: LifecycleBinding,
}

impl<T: Clone + Send + Sync + 'static> Provider<T> {
    pub(crate) fn attach(context: &Context<T>, doc: &DocumentRef, host: NodeId) -> Self {
        let inner = Arc::new(ProviderInner {
            context: context.id(),
            init: context.factory(),
            doc: Arc::downgrade(doc),
            host,
            value: RwLock::new(context.initial_value()),
            consumers: Mutex::new(IndexMap::new()),
            listener: Mutex::new(None),
        });

        let on_connect = Arc::downgrade(&inner);
        let on_disconnect = Arc::downgrade(&inner);
        let binding = doc.bind_lifecycle(
            host,
            move |_| {
                if let Some(inner) = on_connect.upgrade() {
                    inner.connect();
                }
            },
            move |_| {
                if let Some(inner) = on_disconnect.upgrade() {
                    inner.disconnect();
                }
            },
        );

        Self { inner, binding }
    }

    pub(crate) fn downgrade(&self) -> Weak<ProviderInner<T>> {
        Arc::downgrade(&self.inner)
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.inner.value()
    }

    /// Replace the value and push it to every registered consumer.
    pub fn set_value(&self, value: T) {
        self.inner.set_value(value);
    }

    /// Modify the value in place and push the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.value();
        f(&mut value);
        self.set_value(value);
    }

    /// Restore the initial value.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.lock().len()
    }

    /// Whether the provider is currently answering requests.
    pub fn is_connected(&self) -> bool {
        self.inner.listener.lock().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Provider<T> {
    fn drop(&mut self) {
        if let Some(doc) = self.inner.doc.upgrade() {
            doc.unbind_lifecycle(self.binding);
        }
        self.inner.disconnect();
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.inner.context)
            .field("host", &self.inner.host)
            .field("consumers", &self.consumer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use dom::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain(doc: &Document, names: &[&str]) -> Vec<NodeId> {
        let mut parent = doc.root();
        names
            .iter()
            .map(|name| {
                let node = doc.create_element(name);
                doc.append_child(parent, node).unwrap();
                parent = node;
                node
            })
            .collect()
    }

    #[test]
    fn test_consumer_pairs_with_ancestor_immediately() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "media-controls", "media-mute-button"]);
        let context = Context::new(|| 0.0_f64);

        let provider = context.provide(&doc, nodes[0]);
        provider.set_value(0.5);
        let consumer = context.consume(&doc, nodes[2]);

        assert!(consumer.is_registered());
        assert_eq!(consumer.value(), provider.value());
        assert_eq!(consumer.provider_host(), Some(nodes[0]));
        assert_eq!(provider.consumer_count(), 1);
    }

    #[test]
    fn test_nearest_provider_wins() {
        let doc = Document::new();
        let nodes = chain(&doc, &["outer", "inner", "leaf"]);
        let context = Context::new(|| "none");

        let outer = context.provide(&doc, nodes[0]);
        outer.set_value("outer");
        let inner = context.provide(&doc, nodes[1]);
        inner.set_value("inner");

        let consumer = context.consume(&doc, nodes[2]);
        assert_eq!(consumer.value(), "inner");
        assert_eq!(inner.consumer_count(), 1);
        assert_eq!(outer.consumer_count(), 0);

        outer.set_value("changed");
        assert_eq!(consumer.value(), "inner");
    }

    #[test]
    fn test_other_context_passes_through() {
        let doc = Document::new();
        let nodes = chain(&doc, &["outer", "inner", "leaf"]);
        let volume = Context::new(|| 1.0_f64);
        let rate = Context::new(|| 1.0_f64);

        let volume_provider = volume.provide(&doc, nodes[0]);
        volume_provider.set_value(0.3);
        let _rate_provider = rate.provide(&doc, nodes[1]);

        let consumer = volume.consume(&doc, nodes[2]);
        assert_eq!(consumer.value(), 0.3);
    }

    #[test]
    fn test_set_value_reaches_all_consumers() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "controls"]);
        let context = Context::new(|| 0_u32);
        let provider = context.provide(&doc, nodes[0]);

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let host = doc.create_element("media-time-display");
                doc.append_child(nodes[1], host).unwrap();
                context.consume(&doc, host)
            })
            .collect();

        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        consumers[0].subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        provider.update(|v| *v += 42);
        assert!(consumers.iter().all(|c| c.value() == 42));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_orphans_adopted_by_later_provider() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "controls"]);
        let context = Context::new(|| 0_u32);

        let consumers: Vec<_> = (0..5)
            .map(|_| {
                let host = doc.create_element("media-play-button");
                doc.append_child(nodes[1], host).unwrap();
                context.consume(&doc, host)
            })
            .collect();
        assert!(consumers.iter().all(|c| !c.is_registered()));
        assert_eq!(doc.extension::<OrphanRegistry>().count(context.id()), 5);

        let provider = context.provide(&doc, nodes[0]);
        provider.set_value(9);

        assert!(consumers.iter().all(|c| c.is_registered()));
        assert!(consumers.iter().all(|c| c.value() == 9));
        assert_eq!(provider.consumer_count(), 5);
        assert_eq!(doc.extension::<OrphanRegistry>().count(context.id()), 0);
    }

    #[test]
    fn test_provider_ignores_orphans_outside_its_subtree() {
        let doc = Document::new();
        let left = chain(&doc, &["left"]);
        let right = chain(&doc, &["right"]);
        let context = Context::new(|| 0_u32);

        let consumer = context.consume(&doc, right[0]);
        let provider = context.provide(&doc, left[0]);

        assert!(!consumer.is_registered());
        assert_eq!(provider.consumer_count(), 0);
        assert_eq!(doc.extension::<OrphanRegistry>().count(context.id()), 1);
    }

    #[test]
    fn test_provider_disconnect_resets_and_releases_consumers() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "media-seek-bar"]);
        let context = Context::new(|| 0_u32);
        let provider = context.provide(&doc, nodes[0]);
        let consumer = context.consume(&doc, nodes[1]);
        provider.set_value(5);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        consumer.subscribe(move |v| record.lock().push(*v));

        doc.remove_child(nodes[0]);

        assert_eq!(*seen.lock(), vec![0]);
        assert_eq!(consumer.value(), 0);
        assert!(!consumer.is_registered());
        assert_eq!(provider.value(), 0);
        assert_eq!(provider.consumer_count(), 0);
        assert!(!provider.is_connected());
    }

    #[test]
    fn test_consumer_disconnect_unregisters() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "media-seek-bar"]);
        let context = Context::new(|| 0_u32);
        let provider = context.provide(&doc, nodes[0]);
        let _consumer = context.consume(&doc, nodes[1]);
        assert_eq!(provider.consumer_count(), 1);

        doc.remove_child(nodes[1]);
        assert_eq!(provider.consumer_count(), 0);

        doc.append_child(nodes[0], nodes[1]).unwrap();
        assert_eq!(provider.consumer_count(), 1);
    }

    #[test]
    fn test_reconnecting_provider_readopts_released_consumers() {
        let doc = Document::new();
        let nodes = chain(&doc, &["wrapper", "media-player", "media-seek-bar"]);
        let context = Context::new(|| 0_u32);
        let provider = context.provide(&doc, nodes[1]);
        let consumer = context.consume(&doc, nodes[2]);

        // Re-parenting the provider host moves the consumer along with it.
        doc.append_child(doc.root(), nodes[1]).unwrap();
        assert!(consumer.is_registered());
        assert_eq!(provider.consumer_count(), 1);
    }

    #[test]
    fn test_dropping_provider_releases_consumers() {
        let doc = Document::new();
        let nodes = chain(&doc, &["media-player", "media-seek-bar"]);
        let context = Context::new(|| 1_u32);
        let provider = context.provide(&doc, nodes[0]);
        provider.set_value(3);
        let consumer = context.consume(&doc, nodes[1]);

        drop(provider);
        assert!(!consumer.is_registered());
        assert_eq!(consumer.value(), 1);
        // Still mounted, so it waits for the next provider.
        assert_eq!(doc.extension::<OrphanRegistry>().count(context.id()), 1);

        let replacement = context.provide(&doc, nodes[0]);
        assert!(consumer.is_registered());
        assert_eq!(replacement.consumer_count(), 1);
    }
}
