//! Reactive query results.

use crate::ast::Query;
use crate::eval::evaluate;
use crate::parser::parse_query;
use crate::store::{Store, SubscriptionId};
use css_parser::MediaMatcher;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type ChangeListener = Arc<dyn Fn(bool) + Send + Sync>;

struct Compiled {
    source: String,
    query: Arc<Query>,
    dependencies: IndexSet<String>,
    subscription: Option<SubscriptionId>,
    media_watch: Option<u64>,
}

struct QueryListInner {
    store: Store,
    media: Option<Arc<dyn MediaMatcher>>,
    compiled: Mutex<Compiled>,
    matches: Mutex<bool>,
    listeners: Mutex<IndexMap<u64, ChangeListener>>,
    next_listener: AtomicU64,
}

/// A query evaluated against a [`Store`], kept up to date as the fields it
/// references change.
///
/// Listeners registered with [`QueryList::on_change`] run once per settled
/// recomputation whose result differs from the previous one.
pub struct QueryList {
    inner: Arc<QueryListInner>,
}

impl QueryList {
    /// Query without native media support; `@media` clauses are false.
    pub fn new(store: &Store, query: &str) -> Self {
        Self::build(store, query, None)
    }

    /// Query whose `@media` clauses are answered by `media`.
    pub fn with_media(store: &Store, query: &str, media: Arc<dyn MediaMatcher>) -> Self {
        Self::build(store, query, Some(media))
    }

    fn build(store: &Store, query: &str, media: Option<Arc<dyn MediaMatcher>>) -> Self {
        let inner = Arc::new(QueryListInner {
            store: store.clone(),
            media,
            compiled: Mutex::new(Compiled {
                source: String::new(),
                query: Arc::new(Query::default()),
                dependencies: IndexSet::new(),
                subscription: None,
                media_watch: None,
            }),
            matches: Mutex::new(false),
            listeners: Mutex::new(IndexMap::new()),
            next_listener: AtomicU64::new(1),
        });
        inner.compile(query);
        *inner.matches.lock() = inner.evaluate();
        Self { inner }
    }

    /// Cached result.
    pub fn matches(&self) -> bool {
        *self.inner.matches.lock()
    }

    /// The raw query string.
    pub fn query(&self) -> String {
        self.inner.compiled.lock().source.clone()
    }

    /// Replace the query. Dependencies are recomputed; listeners hear about
    /// it only if the result changes.
    pub fn set_query(&self, query: &str) {
        if self.inner.compiled.lock().source == query {
            return;
        }
        self.inner.compile(query);
        self.inner.refresh();
    }

    /// Referenced fields known to the store.
    pub fn dependencies(&self) -> Vec<String> {
        self.inner.compiled.lock().dependencies.iter().cloned().collect()
    }

    pub fn on_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> u64 {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        id
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        self.inner.listeners.lock().shift_remove(&id).is_some()
    }

    /// Re-evaluate now. Returns the (possibly updated) result.
    pub fn refresh(&self) -> bool {
        self.inner.refresh();
        self.matches()
    }
}

impl QueryListInner {
    fn compile(self: &Arc<Self>, source: &str) {
        let query = parse_query(source);
        let referenced = query.fields();
        let dependencies: IndexSet<String> = referenced
            .iter()
            .filter(|field| self.store.has_field(field))
            .cloned()
            .collect();
        for unknown in referenced.iter().filter(|field| !dependencies.contains(*field)) {
            tracing::debug!(field = %unknown, query = source, "query references unknown field");
        }

        // Unknown fields are still watched so defining one later re-evaluates.
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = (!referenced.is_empty()).then(|| {
            let weak = weak.clone();
            self.store.subscribe(referenced.iter().cloned(), move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            })
        });

        let media_watch = match &self.media {
            Some(media) if query.has_media() => Some(media.watch(Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            }))),
            _ => None,
        };

        let previous = std::mem::replace(
            &mut *self.compiled.lock(),
            Compiled {
                source: source.to_string(),
                query: Arc::new(query),
                dependencies,
                subscription,
                media_watch,
            },
        );
        self.release(previous);
    }

    fn release(&self, compiled: Compiled) {
        if let Some(id) = compiled.subscription {
            self.store.unsubscribe(id);
        }
        if let (Some(media), Some(id)) = (&self.media, compiled.media_watch) {
            media.unwatch(id);
        }
    }

    fn evaluate(&self) -> bool {
        let query = self.compiled.lock().query.clone();
        evaluate(&query, &self.store, self.media.as_deref())
    }

    fn refresh(&self) {
        let result = self.evaluate();
        {
            let mut matches = self.matches.lock();
            if *matches == result {
                return;
            }
            *matches = result;
        }

        tracing::debug!(query = %self.compiled.lock().source, matches = result, "query result changed");
        let listeners: Vec<ChangeListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(result);
        }
    }
}

impl Drop for QueryList {
    fn drop(&mut self) {
        let compiled = std::mem::replace(
            &mut *self.inner.compiled.lock(),
            Compiled {
                source: String::new(),
                query: Arc::new(Query::default()),
                dependencies: IndexSet::new(),
                subscription: None,
                media_watch: None,
            },
        );
        self.inner.release(compiled);
    }
}

impl fmt::Debug for QueryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryList")
            .field("query", &self.query())
            .field("matches", &self.matches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateValue;
    use css_parser::{MediaContext, MediaEnvironment};

    fn record(list: &QueryList) -> Arc<Mutex<Vec<bool>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        list.on_change(move |matches| sink.lock().push(matches));
        events
    }

    #[test]
    fn test_change_fires_once_when_result_flips() {
        let store = Store::with_fields([("width", 0)]);
        let list = QueryList::new(&store, "(width: 300)");
        let events = record(&list);
        assert!(!list.matches());

        store.set("width", 300);
        assert!(list.matches());
        assert_eq!(*events.lock(), vec![true]);

        store.set("width", 300);
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_no_change_when_result_is_stable() {
        let store = Store::with_fields([("width", 0)]);
        let list = QueryList::new(&store, "(width < 400)");
        let events = record(&list);

        store.set("width", 100);
        store.set("width", 200);
        assert!(list.matches());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_never_is_always_false() {
        let store = Store::with_fields([("paused", true)]);
        let list = QueryList::new(&store, "never");
        let events = record(&list);
        store.set("paused", false);
        store.set("paused", true);
        assert!(!list.matches());
        assert!(events.lock().is_empty());
        assert!(list.dependencies().is_empty());
    }

    #[test]
    fn test_batch_settles_into_one_change() {
        let store = Store::with_fields([("width", 0), ("height", 0)]);
        let list = QueryList::new(&store, "(width > 100) and (height > 100)");
        let events = record(&list);

        store.batch(|s| {
            s.set("width", 200);
            s.set("height", 200);
        });
        assert_eq!(*events.lock(), vec![true]);
    }

    #[test]
    fn test_unknown_field_is_false_until_defined() {
        let store = Store::new();
        let list = QueryList::new(&store, "(buffering)");
        assert!(!list.matches());
        assert!(list.dependencies().is_empty());

        store.set("buffering", true);
        assert!(list.matches());
    }

    #[test]
    fn test_negated_unknown_field_is_false() {
        let store = Store::with_fields([("paused", true)]);
        let list = QueryList::new(&store, "not (missing)");
        let events = record(&list);
        assert!(!list.matches());

        let combined = QueryList::new(&store, "(paused) and not (missing: 1)");
        assert!(!combined.matches());

        store.set("missing", 1);
        assert!(!list.matches());
        assert!(!combined.matches());
        store.set("missing", false);
        assert!(list.matches());
        assert_eq!(*events.lock(), vec![true]);
    }

    #[test]
    fn test_malformed_clause_does_not_poison_query() {
        let store = Store::with_fields([("paused", true)]);
        let list = QueryList::new(&store, "(paused >), (paused)");
        assert!(list.matches());
        store.set("paused", StateValue::Bool(false));
        assert!(!list.matches());
    }

    #[test]
    fn test_set_query_updates_dependencies() {
        let store = Store::with_fields([
            ("width", StateValue::from(500)),
            ("muted", StateValue::from(false)),
        ]);
        let list = QueryList::new(&store, "(width < 400)");
        let events = record(&list);
        assert_eq!(list.dependencies(), vec!["width".to_string()]);

        list.set_query("not (muted)");
        assert_eq!(list.query(), "not (muted)");
        assert_eq!(list.dependencies(), vec!["muted".to_string()]);
        assert_eq!(*events.lock(), vec![true]);

        // The old dependency no longer drives recomputation.
        store.set("width", 100);
        assert_eq!(events.lock().len(), 1);
        assert_eq!(store.subscription_count(), 1);
    }

    #[test]
    fn test_media_clause_follows_environment() {
        let store = Store::new();
        let env = Arc::new(MediaEnvironment::new(MediaContext::screen(1280.0, 720.0)));
        let list = QueryList::with_media(&store, "@media (max-width: 600px)", env.clone());
        let events = record(&list);
        assert!(!list.matches());

        env.set_viewport(480.0, 800.0);
        assert!(list.matches());
        assert_eq!(*events.lock(), vec![true]);

        drop(list);
        assert_eq!(env.watcher_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = Store::with_fields([("width", 0)]);
        let list = QueryList::new(&store, "(width > 1)");
        assert_eq!(store.subscription_count(), 1);
        drop(list);
        assert_eq!(store.subscription_count(), 0);
    }
}
