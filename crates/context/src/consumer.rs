//! Context consumers.

use crate::context::Context;
use crate::orphans::{OrphanEntry, OrphanRegistry};
use dom::{
    ContextId, ContextRequest, Document, DocumentRef, Event, EventDetail, EventType,
    LifecycleBinding, NodeId,
};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;
type RegisteredCallback<T> = Box<dyn FnOnce(&T) + Send>;
pub(crate) type Unregister = Box<dyn FnOnce() + Send>;

fn next_slot_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Consumer-side state shared with the provider it pairs with.
///
/// The slot travels inside the discovery event as the type-erased sink; a
/// provider of the same context downcasts it back to `ConsumerSlot<T>`.
pub(crate) struct ConsumerSlot<T> {
    pub(crate) id: u64,
    pub(crate) context: ContextId,
    pub(crate) host: NodeId,
    doc: Weak<Document>,
    value: RwLock<T>,
    registered: AtomicBool,
    provider: Mutex<Option<NodeId>>,
    when_registered: Mutex<Vec<RegisteredCallback<T>>>,
    subscribers: Mutex<IndexMap<u64, Subscriber<T>>>,
    next_subscriber: AtomicU64,
    unregister: Mutex<Option<Unregister>>,
}

impl<T: Clone + Send + Sync + 'static> ConsumerSlot<T> {
    fn new(context: ContextId, host: NodeId, initial: T, doc: Weak<Document>) -> Self {
        Self {
            id: next_slot_id(),
            context,
            host,
            doc,
            value: RwLock::new(initial),
            registered: AtomicBool::new(false),
            provider: Mutex::new(None),
            when_registered: Mutex::new(Vec::new()),
            subscribers: Mutex::new(IndexMap::new()),
            next_subscriber: AtomicU64::new(1),
            unregister: Mutex::new(None),
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Complete pairing with a provider on `provider_host`.
    pub(crate) fn pair(&self, provider_host: NodeId, value: T, unregister: Unregister) {
        let previous = self.unregister.lock().replace(unregister);
        if let Some(previous) = previous {
            previous();
        }

        *self.value.write() = value.clone();
        *self.provider.lock() = Some(provider_host);
        self.registered.store(true, Ordering::SeqCst);

        let pending = std::mem::take(&mut *self.when_registered.lock());
        for callback in pending {
            callback(&value);
        }
        self.notify(&value);
    }

    /// Deliver a new value from the paired provider.
    pub(crate) fn update(&self, value: T) {
        *self.value.write() = value.clone();
        self.notify(&value);
    }

    /// The paired provider went away: fall back to `initial` and, while the
    /// host is still mounted, wait for a new provider as an orphan.
    pub(crate) fn release(self: &Arc<Self>, initial: T) {
        self.unregister.lock().take();
        *self.provider.lock() = None;
        self.registered.store(false, Ordering::SeqCst);
        *self.value.write() = initial.clone();
        self.notify(&initial);

        if let Some(doc) = self.doc.upgrade() {
            if doc.is_connected(self.host) {
                doc.extension::<OrphanRegistry>()
                    .insert(self.context, self.orphan_entry());
            }
        }
    }

    fn orphan_entry(self: &Arc<Self>) -> OrphanEntry {
        OrphanEntry {
            host: self.host,
            slot: self.id,
            sink: self.clone() as Arc<dyn Any + Send + Sync>,
        }
    }

    fn notify(&self, value: &T) {
        let subscribers: Vec<Subscriber<T>> = self.subscribers.lock().values().cloned().collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }

    /// Host connected: ask the ancestors for a provider.
    fn connect(self: &Arc<Self>) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };

        let request = ContextRequest {
            context: self.context,
            consumer: self.host,
            sink: self.clone() as Arc<dyn Any + Send + Sync>,
        };
        let mut event = Event::with_detail(EventType::ContextRequest, EventDetail::Context(request));
        doc.dispatch_event(self.host, &mut event);

        if !self.is_registered() {
            tracing::debug!(context = %self.context, "no provider above consumer, waiting as orphan");
            doc.extension::<OrphanRegistry>()
                .insert(self.context, self.orphan_entry());
        }
    }

    /// Host disconnected: leave the orphan table and the provider.
    fn disconnect(&self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.extension::<OrphanRegistry>().remove(self.context, self.id);
        }

        let unregister = self.unregister.lock().take();
        if let Some(unregister) = unregister {
            unregister();
        }
        *self.provider.lock() = None;
        self.registered.store(false, Ordering::SeqCst);
    }
}

/// Read side of a context, bound to a host node.
///
/// The value is always the last one received from the paired provider, or
/// the context's initial value before pairing.
pub struct Consumer<T: Clone + Send + Sync + 'static> {
    slot: Arc<ConsumerSlot<T>>,
    doc: Weak<Document>,
    binding: LifecycleBinding,
}

impl<T: Clone + Send + Sync + 'static> Consumer<T> {
    pub(crate) fn attach(context: &Context<T>, doc: &DocumentRef, host: NodeId) -> Self {
        let slot = Arc::new(ConsumerSlot::new(
            context.id(),
            host,
            context.initial_value(),
            Arc::downgrade(doc),
        ));

        let on_connect = Arc::downgrade(&slot);
        let on_disconnect = Arc::downgrade(&slot);
        let binding = doc.bind_lifecycle(
            host,
            move |_| {
                if let Some(slot) = on_connect.upgrade() {
                    slot.connect();
                }
            },
            move |_| {
                if let Some(slot) = on_disconnect.upgrade() {
                    slot.disconnect();
                }
            },
        );

        Self {
            slot,
            doc: Arc::downgrade(doc),
            binding,
        }
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.slot.value.read().clone()
    }

    /// Whether a provider is currently paired.
    pub fn is_registered(&self) -> bool {
        self.slot.is_registered()
    }

    /// Run `callback` once pairing completes; immediately if already paired.
    pub fn when_registered(&self, callback: impl FnOnce(&T) + Send + 'static) {
        if self.is_registered() {
            callback(&self.value());
            return;
        }
        self.slot.when_registered.lock().push(Box::new(callback));
    }

    /// Observe every delivered value. Returns an id for [`Self::unsubscribe`].
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> u64 {
        let id = self.slot.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.slot.subscribers.lock().insert(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.slot.subscribers.lock().shift_remove(&id).is_some()
    }

    pub fn host(&self) -> NodeId {
        self.slot.host
    }

    pub fn context_id(&self) -> ContextId {
        self.slot.context
    }

    /// Host of the paired provider.
    pub fn provider_host(&self) -> Option<NodeId> {
        *self.slot.provider.lock()
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Consumer<T> {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.unbind_lifecycle(self.binding);
        }
        self.slot.disconnect();
    }
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("context", &self.slot.context)
            .field("host", &self.slot.host)
            .field("registered", &self.is_registered())
            .finish()
    }
}
