//! Live media environment.
//!
//! [`MediaEnvironment`] answers `@media` queries against a mutable
//! [`MediaContext`] (viewport, pointer, preferences) and tells watchers when
//! that context changes so dependent query results can be re-evaluated.

use crate::media::{MediaContext, MediaQueryList};
use crate::parser::parse_media_query_list;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Watcher callback.
pub type MediaWatcher = Arc<dyn Fn() + Send + Sync>;

/// Native media query matcher.
pub trait MediaMatcher: Send + Sync {
    /// Evaluate a media query list such as `(max-width: 600px)`.
    fn matches(&self, query: &str) -> bool;

    /// Be told when the environment changes. Returns a watcher id.
    fn watch(&self, callback: MediaWatcher) -> u64;

    fn unwatch(&self, id: u64) -> bool;
}

/// Mutable media environment with a parsed-query cache.
pub struct MediaEnvironment {
    context: RwLock<MediaContext>,
    cache: RwLock<HashMap<String, Arc<MediaQueryList>>>,
    watchers: Mutex<IndexMap<u64, MediaWatcher>>,
    next_watcher: AtomicU64,
}

impl MediaEnvironment {
    pub fn new(context: MediaContext) -> Self {
        Self {
            context: RwLock::new(context),
            cache: RwLock::new(HashMap::new()),
            watchers: Mutex::new(IndexMap::new()),
            next_watcher: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> MediaContext {
        self.context.read().clone()
    }

    /// Modify the context; watchers run only if something changed.
    pub fn update(&self, f: impl FnOnce(&mut MediaContext)) {
        let changed = {
            let mut context = self.context.write();
            let before = context.clone();
            f(&mut context);
            *context != before
        };
        if changed {
            self.notify();
        }
    }

    /// Resize the viewport.
    pub fn set_viewport(&self, width: f32, height: f32) {
        tracing::debug!(width, height, "viewport changed");
        self.update(|context| {
            context.width = width;
            context.height = height;
        });
    }

    /// Parse (or fetch from cache) a media query list.
    pub fn parse(&self, query: &str) -> Arc<MediaQueryList> {
        if let Some(list) = self.cache.read().get(query) {
            return list.clone();
        }
        let list = Arc::new(parse_media_query_list(query));
        self.cache
            .write()
            .insert(query.to_string(), list.clone());
        list
    }

    /// Evaluate a media query list against the current context.
    pub fn evaluate(&self, query: &str) -> bool {
        let list = self.parse(query);
        list.matches(&self.context.read())
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    fn notify(&self) {
        let watchers: Vec<MediaWatcher> = self.watchers.lock().values().cloned().collect();
        for watcher in watchers {
            watcher();
        }
    }
}

impl Default for MediaEnvironment {
    fn default() -> Self {
        Self::new(MediaContext::default())
    }
}

impl MediaMatcher for MediaEnvironment {
    fn matches(&self, query: &str) -> bool {
        self.evaluate(query)
    }

    fn watch(&self, callback: MediaWatcher) -> u64 {
        let id = self.next_watcher.fetch_add(1, Ordering::Relaxed);
        self.watchers.lock().insert(id, callback);
        id
    }

    fn unwatch(&self, id: u64) -> bool {
        self.watchers.lock().shift_remove(&id).is_some()
    }
}

impl std::fmt::Debug for MediaEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaEnvironment")
            .field("context", &*self.context.read())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_evaluate_tracks_viewport() {
        let env = MediaEnvironment::new(MediaContext::screen(1280.0, 720.0));
        assert!(!env.matches("(max-width: 600px)"));

        env.set_viewport(480.0, 800.0);
        assert!(env.matches("(max-width: 600px)"));
        assert!(env.matches("(orientation: portrait)"));
    }

    #[test]
    fn test_watchers_run_only_on_change() {
        let env = MediaEnvironment::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = env.watch(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        env.set_viewport(800.0, 600.0);
        env.set_viewport(800.0, 600.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(env.unwatch(id));
        env.update(|c| c.prefers_dark = true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_cache_is_shared() {
        let env = MediaEnvironment::default();
        let a = env.parse("(hover)");
        let b = env.parse("(hover)");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
