//! Cross-instance media synchronization.
//!
//! A [`MediaSync`] container tracks every [`MediaProvider`] announcing
//! itself beneath its host and keeps them in the document's
//! [`SyncRegistry`]. Depending on its [`SyncConfig`] it persists volume,
//! pauses other players when one starts, and mirrors volume changes across
//! all players.
//!
//! Mirroring a change makes the targets fire their own notifications, which
//! would re-enter the handlers. Each behaviour therefore runs under a
//! [`GuardCell`] shared by the whole document.

use crate::provider::MediaProvider;
use crate::state::VolumeSnapshot;
use dom::{
    Document, DocumentRef, Event, EventDetail, EventType, LifecycleId, ListenerId, NodeId,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use web_apis::Storage;

/// Which synchronization behaviours a container applies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Storage key for the persisted volume snapshot.
    pub volume_storage_key: Option<String>,
    /// Pause every other player when one starts playing.
    pub single_playback: bool,
    /// Mirror volume and muted across players.
    pub shared_volume: bool,
}

impl SyncConfig {
    pub fn with_volume_storage_key(mut self, key: impl Into<String>) -> Self {
        self.volume_storage_key = Some(key.into());
        self
    }

    pub fn with_single_playback(mut self, enabled: bool) -> Self {
        self.single_playback = enabled;
        self
    }

    pub fn with_shared_volume(mut self, enabled: bool) -> Self {
        self.shared_volume = enabled;
        self
    }

    /// Every behaviour on, persisting under `media-volume`.
    pub fn all() -> Self {
        Self::default()
            .with_volume_storage_key("media-volume")
            .with_single_playback(true)
            .with_shared_volume(true)
    }
}

/// Reentrancy state of a synchronization behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncGuard {
    #[default]
    Idle,
    /// Applying a change that originated at `origin`.
    Mirroring { origin: NodeId },
}

/// Holder of a [`SyncGuard`].
#[derive(Debug, Default)]
pub struct GuardCell {
    state: Mutex<SyncGuard>,
}

impl GuardCell {
    pub fn state(&self) -> SyncGuard {
        *self.state.lock()
    }

    pub fn is_mirroring(&self) -> bool {
        matches!(self.state(), SyncGuard::Mirroring { .. })
    }

    /// Start mirroring a change from `origin`. Returns `None` while another
    /// mirror is in progress.
    pub fn enter(&self, origin: NodeId) -> Option<GuardToken<'_>> {
        let mut state = self.state.lock();
        match *state {
            SyncGuard::Idle => {
                *state = SyncGuard::Mirroring { origin };
                Some(GuardToken { cell: self })
            }
            SyncGuard::Mirroring { .. } => None,
        }
    }
}

/// Returns its guard to [`SyncGuard::Idle`] when dropped.
#[derive(Debug)]
pub struct GuardToken<'a> {
    cell: &'a GuardCell,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        *self.cell.state.lock() = SyncGuard::Idle;
    }
}

/// Every synchronized provider on a page, with the page's guards.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    providers: Mutex<IndexMap<NodeId, Weak<MediaProvider>>>,
    playback: GuardCell,
    volume: GuardCell,
}

impl SyncRegistry {
    /// The registry of `doc`.
    pub fn of(doc: &Document) -> Arc<Self> {
        doc.extension::<Self>()
    }

    pub fn register(&self, provider: &Arc<MediaProvider>) {
        self.providers
            .lock()
            .insert(provider.host(), Arc::downgrade(provider));
    }

    pub fn unregister(&self, host: NodeId) -> bool {
        self.providers.lock().shift_remove(&host).is_some()
    }

    pub fn get(&self, host: NodeId) -> Option<Arc<MediaProvider>> {
        self.providers.lock().get(&host).and_then(Weak::upgrade)
    }

    pub fn contains(&self, host: NodeId) -> bool {
        self.get(host).is_some()
    }

    /// Live providers in registration order.
    pub fn providers(&self) -> Vec<Arc<MediaProvider>> {
        self.providers
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Guard for single playback.
    pub fn playback_guard(&self) -> &GuardCell {
        &self.playback
    }

    /// Guard for shared volume.
    pub fn volume_guard(&self) -> &GuardCell {
        &self.volume
    }
}

struct Tracked {
    listeners: Vec<ListenerId>,
    disconnect: LifecycleId,
}

struct SyncInner {
    doc: Weak<Document>,
    host: NodeId,
    config: SyncConfig,
    storage: Arc<dyn Storage>,
    registry: Arc<SyncRegistry>,
    tracked: Mutex<IndexMap<NodeId, Tracked>>,
    listener: Mutex<Option<ListenerId>>,
    pending_mirror: Mutex<Option<NodeId>>,
}

/// Synchronization container bound to a host node.
pub struct MediaSync {
    inner: Arc<SyncInner>,
}

impl MediaSync {
    pub fn attach(
        doc: &DocumentRef,
        host: NodeId,
        config: SyncConfig,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let inner = Arc::new(SyncInner {
            doc: Arc::downgrade(doc),
            host,
            config,
            storage,
            registry: SyncRegistry::of(doc),
            tracked: Mutex::new(IndexMap::new()),
            listener: Mutex::new(None),
            pending_mirror: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let listener = doc.listen(host, EventType::MediaProviderConnect, move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let EventDetail::Element(registration) = &event.detail else {
                return;
            };
            if let Ok(provider) = registration.handle.clone().downcast::<MediaProvider>() {
                inner.track(&provider);
            }
        });
        *inner.listener.lock() = Some(listener);

        Self { inner }
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Providers tracked by this container.
    pub fn tracked(&self) -> Vec<NodeId> {
        self.inner.tracked.lock().keys().copied().collect()
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.inner.registry
    }
}

impl SyncInner {
    fn track(self: &Arc<Self>, provider: &Arc<MediaProvider>) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        let media_host = provider.host();
        self.untrack(media_host);

        self.registry.register(provider);
        self.seed_volume(provider);

        let mut listeners = Vec::new();
        if self.config.single_playback {
            let weak = Arc::downgrade(self);
            listeners.push(doc.listen(media_host, EventType::Play, move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.pause_others(media_host);
                }
            }));
        }
        if self.config.shared_volume || self.config.volume_storage_key.is_some() {
            let weak = Arc::downgrade(self);
            listeners.push(doc.listen(media_host, EventType::VolumeChange, move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.volume_changed(media_host);
                }
            }));
        }

        let weak = Arc::downgrade(self);
        let disconnect = doc.on_next_disconnect(media_host, move |node| {
            if let Some(inner) = weak.upgrade() {
                inner.untrack(node);
            }
        });

        self.tracked.lock().insert(
            media_host,
            Tracked {
                listeners,
                disconnect,
            },
        );
        tracing::debug!(sync = ?self.host, media = ?media_host, total = self.registry.len(), "media provider tracked");
    }

    fn untrack(&self, media_host: NodeId) {
        let Some(tracked) = self.tracked.lock().shift_remove(&media_host) else {
            return;
        };
        self.registry.unregister(media_host);
        if let Some(doc) = self.doc.upgrade() {
            for id in tracked.listeners {
                doc.remove_event_listener(id);
            }
            doc.remove_lifecycle(tracked.disconnect);
        }
        tracing::debug!(sync = ?self.host, media = ?media_host, "media provider untracked");
    }

    fn seed_volume(&self, provider: &MediaProvider) {
        let Some(key) = &self.config.volume_storage_key else {
            return;
        };
        let Some(snapshot) = self.load_snapshot(key) else {
            return;
        };
        if let Err(err) = provider.set_volume(snapshot.volume) {
            tracing::warn!(key = %key, error = %err, "ignoring persisted volume");
            return;
        }
        provider.set_muted(snapshot.muted);
    }

    fn load_snapshot(&self, key: &str) -> Option<VolumeSnapshot> {
        let raw = match self.storage.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, error = %err, "volume storage unavailable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding unreadable volume snapshot");
                None
            }
        }
    }

    fn persist_volume(&self, key: &str, provider: &MediaProvider) {
        let snapshot = VolumeSnapshot {
            volume: provider.volume(),
            muted: provider.muted(),
        };
        let result = serde_json::to_string(&snapshot)
            .map_err(common::PlayerError::from)
            .and_then(|json| {
                self.storage
                    .set_item(key, &json)
                    .map_err(|err| common::PlayerError::storage(err.to_string()))
            });
        if let Err(err) = result {
            tracing::warn!(key, error = %err, "failed to persist volume");
        }
    }

    fn pause_others(&self, origin: NodeId) {
        let Some(_token) = self.registry.playback_guard().enter(origin) else {
            return;
        };
        for provider in self.registry.providers() {
            if provider.host() != origin && !provider.paused() {
                tracing::debug!(origin = ?origin, paused = ?provider.host(), "single playback");
                provider.pause();
            }
        }
    }

    fn volume_changed(self: &Arc<Self>, origin: NodeId) {
        let Some(provider) = self.registry.get(origin) else {
            return;
        };
        if let Some(key) = &self.config.volume_storage_key {
            self.persist_volume(key, &provider);
        }

        if !self.config.shared_volume || self.registry.volume_guard().is_mirroring() {
            return;
        }
        // Bursts within one turn collapse into a single mirror.
        let first = self.pending_mirror.lock().replace(origin).is_none();
        if first {
            if let Some(doc) = self.doc.upgrade() {
                let weak = Arc::downgrade(self);
                doc.queue_microtask(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.mirror_volume();
                    }
                });
            }
        }
    }

    fn mirror_volume(&self) {
        let Some(origin) = self.pending_mirror.lock().take() else {
            return;
        };
        let Some(source) = self.registry.get(origin) else {
            return;
        };
        let (volume, muted) = {
            let Some(_token) = self.registry.volume_guard().enter(origin) else {
                return;
            };
            let (volume, muted) = (source.volume(), source.muted());
            for provider in self.registry.providers() {
                if provider.host() == origin {
                    continue;
                }
                if let Err(err) = provider.set_volume(volume) {
                    tracing::warn!(media = ?provider.host(), error = %err, "volume mirror failed");
                }
                provider.set_muted(muted);
            }
            (volume, muted)
        };

        tracing::debug!(origin = ?origin, volume, muted, "volume synced");
        if let Some(doc) = self.doc.upgrade() {
            let mut event =
                Event::with_detail(EventType::VolumeSynced, EventDetail::Volume { volume, muted });
            doc.dispatch_event(self.host, &mut event);
        }
    }
}

impl Drop for MediaSync {
    fn drop(&mut self) {
        let hosts: Vec<NodeId> = self.inner.tracked.lock().keys().copied().collect();
        for host in hosts {
            self.inner.untrack(host);
        }
        if let (Some(doc), Some(id)) = (self.inner.doc.upgrade(), self.inner.listener.lock().take()) {
            doc.remove_event_listener(id);
        }
    }
}

impl std::fmt::Debug for MediaSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSync")
            .field("host", &self.inner.host)
            .field("config", &self.inner.config)
            .field("tracked", &self.tracked())
            .finish()
    }
}
