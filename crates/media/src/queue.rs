//! Pending request queue.
//!
//! Commands issued before an engine is ready wait here, one per key. Queuing
//! under a key that already holds an action replaces it, so a burst of
//! seeks before the media loads collapses to the last target. Once started,
//! the queue runs every action immediately.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Deferred command.
pub type QueuedAction = Box<dyn FnOnce() + Send>;

/// Keyed, coalescing queue of deferred actions.
pub struct RequestQueue {
    started: AtomicBool,
    pending: Mutex<IndexMap<String, QueuedAction>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            pending: Mutex::new(IndexMap::new()),
        }
    }

    /// Run `action` now if started, otherwise hold it under `key`,
    /// dropping whatever was held there before.
    pub fn queue(&self, key: impl Into<String>, action: impl FnOnce() + Send + 'static) {
        if self.is_started() {
            action();
            return;
        }

        let key = key.into();
        let replaced = self.pending.lock().insert(key.clone(), Box::new(action));
        if replaced.is_some() {
            tracing::debug!(key = %key, "queued request superseded");
        }
    }

    /// Run everything pending, then keep running new actions immediately.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        let pending = std::mem::take(&mut *self.pending.lock());
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "flushing queued requests");
        }
        for (_, action) in pending {
            action();
        }
    }

    /// Stop running actions immediately. Pending actions are kept.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Stop and discard everything pending.
    pub fn destroy(&self) {
        self.stop();
        let discarded = std::mem::take(&mut *self.pending.lock());
        if !discarded.is_empty() {
            tracing::debug!(count = discarded.len(), "discarded queued requests");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently holding an action, in queue order.
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.lock().keys().cloned().collect()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("started", &self.is_started())
            .field("pending", &self.pending_keys())
            .finish()
    }
}
