//! Document: the world object that owns the component tree.
//!
//! A [`Document`] bundles everything components need to find each other
//! without direct references: the tree, event listeners, connect/disconnect
//! lifecycle hooks, a microtask queue and per-document extension state.
//! Locks are never held while user callbacks run, so callbacks may freely
//! re-enter the document (dispatch nested events, mutate the tree, add or
//! remove listeners).

use crate::events::{Event, EventListenerOptions, EventManager, EventPhase, EventType, ListenerId};
use crate::node::NodeId;
use crate::tasks::MicrotaskQueue;
use crate::tree::{DomTree, TreeMutation};
use common::PlayerResult;
use parking_lot::{Mutex, RwLock};
use slotmap::{new_key_type, SlotMap};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared document handle.
pub type DocumentRef = Arc<Document>;

new_key_type! {
    /// Handle for a registered lifecycle hook.
    pub struct LifecycleId;
}

/// Lifecycle callback type.
pub type LifecycleCallback = Arc<dyn Fn(NodeId) + Send + Sync>;

enum HookKind {
    Connect(LifecycleCallback),
    Disconnect(LifecycleCallback),
    NextDisconnect(Option<Box<dyn FnOnce(NodeId) + Send>>),
}

struct LifecycleHook {
    node: NodeId,
    kind: HookKind,
}

/// Runnable hook pulled out of the registry.
enum ReadyHook {
    Repeat(LifecycleCallback),
    Once(Box<dyn FnOnce(NodeId) + Send>),
}

#[derive(Default)]
struct Lifecycle {
    hooks: SlotMap<LifecycleId, LifecycleHook>,
    index: HashMap<NodeId, Vec<LifecycleId>>,
}

impl Lifecycle {
    fn insert(&mut self, node: NodeId, kind: HookKind) -> LifecycleId {
        let id = self.hooks.insert(LifecycleHook { node, kind });
        self.index.entry(node).or_default().push(id);
        id
    }

    fn remove(&mut self, id: LifecycleId) -> bool {
        let Some(hook) = self.hooks.remove(id) else {
            return false;
        };
        if let Some(ids) = self.index.get_mut(&hook.node) {
            ids.retain(|h| *h != id);
        }
        true
    }

    fn remove_all(&mut self, node: NodeId) {
        if let Some(ids) = self.index.remove(&node) {
            for id in ids {
                self.hooks.remove(id);
            }
        }
    }

    /// Pull the hooks to run for a transition, in registration order.
    /// One-shot hooks are consumed.
    fn take_ready(&mut self, node: NodeId, connected: bool) -> Vec<ReadyHook> {
        let ids = self.index.get(&node).cloned().unwrap_or_default();
        let mut ready = Vec::new();
        let mut spent = Vec::new();

        for id in ids {
            let Some(hook) = self.hooks.get_mut(id) else {
                continue;
            };
            match (&mut hook.kind, connected) {
                (HookKind::Connect(cb), true) => ready.push(ReadyHook::Repeat(cb.clone())),
                (HookKind::Disconnect(cb), false) => ready.push(ReadyHook::Repeat(cb.clone())),
                (HookKind::NextDisconnect(cb), false) => {
                    if let Some(cb) = cb.take() {
                        ready.push(ReadyHook::Once(cb));
                    }
                    spent.push(id);
                }
                _ => {}
            }
        }

        for id in spent {
            self.remove(id);
        }
        ready
    }
}

/// Connect/disconnect hooks registered together by a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleBinding {
    pub connect: LifecycleId,
    pub disconnect: LifecycleId,
}

/// The document.
pub struct Document {
    tree: RwLock<DomTree>,
    events: RwLock<EventManager>,
    lifecycle: Mutex<Lifecycle>,
    microtasks: Mutex<MicrotaskQueue>,
    extensions: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Document {
    pub fn new() -> DocumentRef {
        Arc::new(Self {
            tree: RwLock::new(DomTree::new()),
            events: RwLock::new(EventManager::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            microtasks: Mutex::new(MicrotaskQueue::new()),
            extensions: RwLock::new(HashMap::new()),
        })
    }

    // Tree

    /// Get the root document node.
    pub fn root(&self) -> NodeId {
        self.tree.read().root()
    }

    /// Create a detached element.
    pub fn create_element(&self, local_name: &str) -> NodeId {
        self.tree.write().create_element(local_name)
    }

    /// Append `child` under `parent`, running disconnect hooks for a moved
    /// subtree and then connect hooks in tree order.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> PlayerResult<()> {
        let mutation = self.tree.write().append_child(parent, child)?;
        self.apply_mutation(mutation);
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent, keeping it alive.
    pub fn remove_child(&self, node: NodeId) {
        let disconnected = self.tree.write().remove_from_parent(node);
        self.apply_mutation(TreeMutation {
            disconnected,
            connected: Vec::new(),
        });
    }

    /// Remove a node and its subtree permanently, dropping its listeners and
    /// lifecycle hooks after disconnect hooks have run.
    pub fn remove(&self, node: NodeId) {
        let subtree: Vec<NodeId> = {
            let tree = self.tree.read();
            std::iter::once(node).chain(tree.descendants(node)).collect()
        };

        self.remove_child(node);
        self.tree.write().remove(node);

        let mut events = self.events.write();
        let mut lifecycle = self.lifecycle.lock();
        for id in subtree {
            events.remove_all(id);
            lifecycle.remove_all(id);
        }
    }

    fn apply_mutation(&self, mutation: TreeMutation) {
        for node in mutation.disconnected {
            self.run_hooks(node, false);
        }
        for node in mutation.connected {
            // An earlier hook may have detached this node again.
            if self.is_connected(node) {
                self.run_hooks(node, true);
            }
        }
    }

    fn run_hooks(&self, node: NodeId, connected: bool) {
        let ready = self.lifecycle.lock().take_ready(node, connected);
        for hook in ready {
            match hook {
                ReadyHook::Repeat(cb) => cb(node),
                ReadyHook::Once(cb) => cb(node),
            }
        }
    }

    /// Whether the node is attached to the document.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.tree.read().is_connected(node)
    }

    /// Inclusive descendant check.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.read().contains(ancestor, node)
    }

    /// Get parent node.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.read().parent(node)
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.read().ancestors(node).collect()
    }

    /// Local name of a node.
    pub fn local_name(&self, node: NodeId) -> Option<String> {
        self.tree.read().get(node).map(|n| n.local_name.clone())
    }

    /// Run a closure with read access to the tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.tree.read())
    }

    // Lifecycle

    /// Register a hook that runs every time `node` connects.
    pub fn on_connect(
        &self,
        node: NodeId,
        callback: impl Fn(NodeId) + Send + Sync + 'static,
    ) -> LifecycleId {
        self.lifecycle
            .lock()
            .insert(node, HookKind::Connect(Arc::new(callback)))
    }

    /// Register a hook that runs every time `node` disconnects.
    pub fn on_disconnect(
        &self,
        node: NodeId,
        callback: impl Fn(NodeId) + Send + Sync + 'static,
    ) -> LifecycleId {
        self.lifecycle
            .lock()
            .insert(node, HookKind::Disconnect(Arc::new(callback)))
    }

    /// Register a hook that runs the next time `node` disconnects, then is
    /// discarded.
    pub fn on_next_disconnect(
        &self,
        node: NodeId,
        callback: impl FnOnce(NodeId) + Send + 'static,
    ) -> LifecycleId {
        self.lifecycle
            .lock()
            .insert(node, HookKind::NextDisconnect(Some(Box::new(callback))))
    }

    /// Register connect and disconnect hooks for a component host. When the
    /// host is already connected, `connected` runs immediately.
    pub fn bind_lifecycle(
        &self,
        node: NodeId,
        connected: impl Fn(NodeId) + Send + Sync + 'static,
        disconnected: impl Fn(NodeId) + Send + Sync + 'static,
    ) -> LifecycleBinding {
        let connected: LifecycleCallback = Arc::new(connected);
        let binding = LifecycleBinding {
            connect: self.on_connect(node, {
                let connected = connected.clone();
                move |n| connected(n)
            }),
            disconnect: self.on_disconnect(node, disconnected),
        };

        if self.is_connected(node) {
            connected(node);
        }
        binding
    }

    /// Remove a lifecycle hook.
    pub fn remove_lifecycle(&self, id: LifecycleId) -> bool {
        self.lifecycle.lock().remove(id)
    }

    /// Remove both hooks of a binding.
    pub fn unbind_lifecycle(&self, binding: LifecycleBinding) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.remove(binding.connect);
        lifecycle.remove(binding.disconnect);
    }

    // Events

    /// Add an event listener.
    pub fn add_event_listener(
        &self,
        node: NodeId,
        event_type: EventType,
        callback: impl Fn(&mut Event) + Send + Sync + 'static,
        options: EventListenerOptions,
    ) -> ListenerId {
        self.events
            .write()
            .add_listener(node, &event_type, Arc::new(callback), options)
    }

    /// Add a non-capturing event listener with default options.
    pub fn listen(
        &self,
        node: NodeId,
        event_type: EventType,
        callback: impl Fn(&mut Event) + Send + Sync + 'static,
    ) -> ListenerId {
        self.add_event_listener(node, event_type, callback, EventListenerOptions::default())
    }

    /// Remove an event listener.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.events.write().remove_listener(id)
    }

    /// Number of listeners registered on a node.
    pub fn listener_count(&self, node: NodeId) -> usize {
        self.events.read().count(node)
    }

    /// Dispatch an event at `target`: capture, at-target, then bubble.
    ///
    /// Returns `false` if a listener prevented the default action.
    pub fn dispatch_event(&self, target: NodeId, event: &mut Event) -> bool {
        tracing::trace!(event = event.event_type.as_str(), "dispatching event");
        event.target = Some(target);
        let path: Vec<NodeId> = {
            let tree = self.tree.read();
            std::iter::once(target).chain(tree.ancestors(target)).collect()
        };

        // Capture phase
        event.phase = EventPhase::Capturing;
        for &node in path.iter().rev().skip(1) {
            event.current_target = Some(node);
            self.invoke_listeners(node, event);
            if event.propagation_stopped {
                return self.finish_dispatch(event);
            }
        }

        // Target phase
        event.phase = EventPhase::AtTarget;
        event.current_target = Some(target);
        self.invoke_listeners(target, event);
        if event.propagation_stopped {
            return self.finish_dispatch(event);
        }

        // Bubble phase
        if event.bubbles {
            event.phase = EventPhase::Bubbling;
            for &node in path.iter().skip(1) {
                event.current_target = Some(node);
                self.invoke_listeners(node, event);
                if event.propagation_stopped {
                    return self.finish_dispatch(event);
                }
            }
        }

        self.finish_dispatch(event)
    }

    fn finish_dispatch(&self, event: &mut Event) -> bool {
        event.phase = EventPhase::None;
        event.current_target = None;
        !event.default_prevented
    }

    fn invoke_listeners(&self, node: NodeId, event: &mut Event) {
        let listeners = self.events.read().collect(node, &event.event_type, event.phase);

        for (id, callback, once) in listeners {
            // A previous listener may have removed this one.
            if !self.events.read().contains(id) {
                continue;
            }
            if once {
                self.events.write().remove_listener(id);
            }

            callback(event);

            if event.immediate_propagation_stopped {
                break;
            }
        }
    }

    // Microtasks

    /// Queue work to run when the current turn settles.
    pub fn queue_microtask(&self, task: impl FnOnce() + Send + 'static) {
        self.microtasks.lock().push(Box::new(task));
    }

    /// Drain the microtask queue, including tasks queued while draining.
    /// Returns the number of tasks run.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.microtasks.lock().pop();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Number of pending microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.lock().len()
    }

    // Extensions

    /// Get (or lazily create) per-document state of type `T`.
    pub fn extension<T: Default + Send + Sync + 'static>(&self) -> Arc<T> {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.extensions.read().get(&key) {
            if let Ok(typed) = existing.clone().downcast::<T>() {
                return typed;
            }
        }

        let mut extensions = self.extensions.write();
        let entry = extensions
            .entry(key)
            .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Any + Send + Sync>)
            .clone();
        match entry.downcast::<T>() {
            Ok(typed) => typed,
            Err(_) => {
                // Unreachable by construction: entries are keyed by TypeId.
                let fresh = Arc::new(T::default());
                extensions.insert(key, fresh.clone());
                fresh
            }
        }
    }
}
