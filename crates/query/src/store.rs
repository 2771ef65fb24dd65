//! Observable player state.
//!
//! A [`Store`] is a flat map of named fields. Subscriptions name the fields
//! they depend on and run only when one of those fields actually changes.
//! Mutations grouped in [`Store::batch`] settle together: each affected
//! subscription runs once after the batch, however many of its fields moved.

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Value of a state field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl StateValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            StateValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by bare field terms like `(paused)`.
    pub fn is_truthy(&self) -> bool {
        match self {
            StateValue::Null => false,
            StateValue::Bool(b) => *b,
            StateValue::Number(n) => *n != 0.0 && !n.is_nan(),
            StateValue::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => write!(f, "null"),
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Number(n) => write!(f, "{}", n),
            StateValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<f32> for StateValue {
    fn from(value: f32) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl<T: Into<StateValue>> From<Option<T>> for StateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(StateValue::Null)
    }
}

/// Handle for a store subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Subscription {
    fields: IndexSet<String>,
    callback: Callback,
}

struct StoreInner {
    fields: RwLock<IndexMap<String, StateValue>>,
    subscriptions: Mutex<IndexMap<SubscriptionId, Subscription>>,
    next_subscription: AtomicU64,
    batch_depth: AtomicUsize,
    pending: Mutex<IndexSet<String>>,
}

/// Shared, observable field map. Clones refer to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                fields: RwLock::new(IndexMap::new()),
                subscriptions: Mutex::new(IndexMap::new()),
                next_subscription: AtomicU64::new(1),
                batch_depth: AtomicUsize::new(0),
                pending: Mutex::new(IndexSet::new()),
            }),
        }
    }

    /// Create a store with the given known fields.
    pub fn with_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
    {
        let store = Self::new();
        {
            let mut map = store.inner.fields.write();
            for (name, value) in fields {
                map.insert(name.into(), value.into());
            }
        }
        store
    }

    /// Current value of a field.
    pub fn get(&self, field: &str) -> Option<StateValue> {
        self.inner.fields.read().get(field).cloned()
    }

    /// Whether the field is known to the store.
    pub fn has_field(&self, field: &str) -> bool {
        self.inner.fields.read().contains_key(field)
    }

    /// Names of every known field, in definition order.
    pub fn field_names(&self) -> Vec<String> {
        self.inner.fields.read().keys().cloned().collect()
    }

    /// Copy of all fields.
    pub fn snapshot(&self) -> IndexMap<String, StateValue> {
        self.inner.fields.read().clone()
    }

    /// Set a field, defining it if needed. Subscribers run only when the
    /// value actually changed. Returns whether it changed.
    pub fn set(&self, field: &str, value: impl Into<StateValue>) -> bool {
        let value = value.into();
        let changed = {
            let mut fields = self.inner.fields.write();
            match fields.get(field) {
                Some(current) if *current == value => false,
                _ => {
                    fields.insert(field.to_string(), value);
                    true
                }
            }
        };

        if changed {
            if self.inner.batch_depth.load(Ordering::SeqCst) > 0 {
                self.inner.pending.lock().insert(field.to_string());
            } else {
                self.notify(std::iter::once(field.to_string()).collect());
            }
        }
        changed
    }

    /// Run `f` with notifications deferred until it returns. Nested batches
    /// settle with the outermost one.
    pub fn batch<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        self.inner.batch_depth.fetch_add(1, Ordering::SeqCst);
        let result = f(self);
        if self.inner.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            let changed = std::mem::take(&mut *self.inner.pending.lock());
            if !changed.is_empty() {
                self.notify(changed);
            }
        }
        result
    }

    /// Run `callback` whenever any of `fields` changes.
    pub fn subscribe<I, S>(&self, fields: I, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            fields: fields.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
        };
        self.inner.subscriptions.lock().insert(id, subscription);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.lock().shift_remove(&id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    fn notify(&self, changed: IndexSet<String>) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscriptions
            .lock()
            .values()
            .filter(|sub| sub.fields.iter().any(|field| changed.contains(field)))
            .map(|sub| sub.callback.clone())
            .collect();

        for callback in callbacks {
            callback();
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("fields", &*self.inner.fields.read())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
