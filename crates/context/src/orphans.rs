//! Consumers waiting for a provider.

use dom::{ContextId, NodeId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A consumer whose discovery request went unanswered.
#[derive(Clone, Debug)]
pub struct OrphanEntry {
    /// Host node of the consumer.
    pub host: NodeId,
    /// Consumer slot id, unique per consumer.
    pub slot: u64,
    /// Type-erased value sink.
    pub sink: Arc<dyn Any + Send + Sync>,
}

/// Orphaned consumers of one document, keyed by context id.
///
/// Lives as a document extension (`doc.extension::<OrphanRegistry>()`), so
/// every document gets its own table.
#[derive(Default)]
pub struct OrphanRegistry {
    entries: Mutex<HashMap<ContextId, Vec<OrphanEntry>>>,
}

impl OrphanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an orphan. A consumer is recorded at most once per context.
    pub fn insert(&self, context: ContextId, entry: OrphanEntry) {
        let mut entries = self.entries.lock();
        let list = entries.entry(context).or_default();
        if !list.iter().any(|e| e.slot == entry.slot) {
            list.push(entry);
        }
    }

    /// Forget an orphan, e.g. because its host disconnected.
    pub fn remove(&self, context: ContextId, slot: u64) -> bool {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(&context) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.slot != slot);
        let removed = list.len() != before;
        if list.is_empty() {
            entries.remove(&context);
        }
        removed
    }

    /// Remove and return every orphan of `context` whose host satisfies
    /// `is_descendant`, preserving registration order.
    pub fn adopt(
        &self,
        context: ContextId,
        is_descendant: impl Fn(NodeId) -> bool,
    ) -> Vec<OrphanEntry> {
        let mut entries = self.entries.lock();
        let Some(list) = entries.get_mut(&context) else {
            return Vec::new();
        };

        let (adopted, remaining): (Vec<_>, Vec<_>) =
            list.drain(..).partition(|e| is_descendant(e.host));
        *list = remaining;
        if list.is_empty() {
            entries.remove(&context);
        }
        adopted
    }

    /// Number of orphans waiting for `context`.
    pub fn count(&self, context: ContextId) -> usize {
        self.entries
            .lock()
            .get(&context)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total number of orphans across all contexts.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
