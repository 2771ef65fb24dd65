//! Media controller.
//!
//! The controller sits on an ancestor of both the playback engine and the
//! controls. It claims the nearest [`MediaProvider`] announcing itself
//! below, handles request events bubbling up from controls and runs them
//! through a [`RequestQueue`] that is started only while the engine is ready.
//! Engine state is published to the subtree through the
//! [`MEDIA_STATE`](crate::state::MEDIA_STATE) context and mirrored into a
//! query [`Store`].

use crate::provider::MediaProvider;
use crate::queue::RequestQueue;
use crate::request::MediaRequest;
use crate::state::{MediaState, MEDIA_STATE};
use context::Provider;
use dom::{Document, DocumentRef, EventDetail, EventType, LifecycleId, ListenerId, NodeId};
use parking_lot::{Mutex, RwLock};
use player_query::{MediaMatcher, QueryList, Store};
use std::sync::{Arc, Weak};
use web_apis::ScreenOrientation;

/// Engine notifications that change observable state.
const STATE_EVENTS: [EventType; 8] = [
    EventType::Play,
    EventType::Pause,
    EventType::VolumeChange,
    EventType::Seeked,
    EventType::RateChange,
    EventType::CanPlay,
    EventType::Emptied,
    EventType::Ended,
];

struct AttachedMedia {
    provider: Weak<MediaProvider>,
    host: NodeId,
    listeners: Vec<ListenerId>,
    disconnect: LifecycleId,
}

struct ControllerInner {
    doc: Weak<Document>,
    host: NodeId,
    queue: RequestQueue,
    state: Provider<MediaState>,
    store: Store,
    media: RwLock<Option<AttachedMedia>>,
    orientation: RwLock<Option<Arc<ScreenOrientation>>>,
    listeners: Mutex<Vec<ListenerId>>,
}

/// Controller component bound to a host node.
pub struct MediaController {
    inner: Arc<ControllerInner>,
}

impl MediaController {
    pub fn attach(doc: &DocumentRef, host: NodeId) -> Self {
        let store = Store::with_fields(MediaState::idle().fields());
        let inner = Arc::new(ControllerInner {
            doc: Arc::downgrade(doc),
            host,
            queue: RequestQueue::new(),
            state: MEDIA_STATE.provide(doc, host),
            store,
            media: RwLock::new(None),
            orientation: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
        });

        let mut listeners = Vec::new();
        for event_type in MediaRequest::event_types() {
            let weak = Arc::downgrade(&inner);
            listeners.push(doc.listen(host, event_type, move |event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let Some(request) = MediaRequest::from_event(event) else {
                    tracing::warn!(request = event.event_type.as_str(), "malformed media request");
                    return;
                };
                event.stop_propagation();
                inner.handle(request, event.is_trusted_origin());
            }));
        }

        let weak = Arc::downgrade(&inner);
        listeners.push(doc.listen(host, EventType::MediaProviderConnect, move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let EventDetail::Element(registration) = &mut event.detail else {
                return;
            };
            // A nearer controller already claimed it.
            if registration.owner.is_some() {
                return;
            }
            let Ok(provider) = registration.handle.clone().downcast::<MediaProvider>() else {
                return;
            };
            registration.owner = Some(inner.host);
            inner.attach_media(&provider);
        }));
        *inner.listeners.lock() = listeners;

        Self { inner }
    }

    /// Route orientation requests to `screen`.
    pub fn with_orientation(self, screen: Arc<ScreenOrientation>) -> Self {
        *self.inner.orientation.write() = Some(screen);
        self
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    /// Current published state.
    pub fn state(&self) -> MediaState {
        self.inner.state.value()
    }

    /// Store mirroring the published state.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Engine currently attached.
    pub fn media(&self) -> Option<Arc<MediaProvider>> {
        self.inner.media()
    }

    /// Attach an engine directly, bypassing discovery.
    pub fn set_media(&self, provider: &Arc<MediaProvider>) {
        self.inner.attach_media(provider);
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.inner.queue
    }

    /// Number of controls consuming this controller's state.
    pub fn consumer_count(&self) -> usize {
        self.inner.state.consumer_count()
    }

    /// Query over this controller's state.
    pub fn query(&self, query: &str) -> QueryList {
        QueryList::new(&self.inner.store, query)
    }

    /// Query over this controller's state with `@media` support.
    pub fn query_with_media(&self, query: &str, media: Arc<dyn MediaMatcher>) -> QueryList {
        QueryList::with_media(&self.inner.store, query, media)
    }
}

impl ControllerInner {
    fn media(&self) -> Option<Arc<MediaProvider>> {
        self.media
            .read()
            .as_ref()
            .and_then(|attached| attached.provider.upgrade())
    }

    fn handle(self: &Arc<Self>, request: MediaRequest, trusted: bool) {
        tracing::debug!(?request, trusted, started = self.queue.is_started(), "media request");
        let key = request.key().to_string();
        let weak = Arc::downgrade(self);
        self.queue.queue(key, move || {
            if let Some(inner) = weak.upgrade() {
                inner.execute(request);
            }
        });
    }

    fn execute(&self, request: MediaRequest) {
        match request {
            MediaRequest::LockOrientation(lock) => {
                let screen = self.orientation.read().clone();
                let result = match screen {
                    Some(screen) => screen.lock_str(&lock),
                    None => Err(common::PlayerError::unsupported("screen orientation lock")),
                };
                if let Err(err) = result {
                    tracing::warn!(%lock, error = %err, "orientation lock failed");
                }
                return;
            }
            MediaRequest::UnlockOrientation => {
                if let Some(screen) = self.orientation.read().clone() {
                    screen.unlock();
                }
                return;
            }
            _ => {}
        }

        let Some(media) = self.media() else {
            tracing::warn!(?request, "no media attached");
            return;
        };

        let result = match &request {
            MediaRequest::Play => media.play(),
            MediaRequest::Pause => {
                media.pause();
                Ok(())
            }
            MediaRequest::TogglePaused => {
                if media.paused() {
                    media.play()
                } else {
                    media.pause();
                    Ok(())
                }
            }
            MediaRequest::Mute => {
                media.set_muted(true);
                Ok(())
            }
            MediaRequest::Unmute => {
                media.set_muted(false);
                Ok(())
            }
            MediaRequest::ToggleMuted => {
                media.set_muted(!media.muted());
                Ok(())
            }
            MediaRequest::Seek(time) => media.seek(*time),
            MediaRequest::ChangeVolume(volume) => media.set_volume(*volume),
            MediaRequest::ChangePlaybackRate(rate) => media.set_playback_rate(*rate),
            MediaRequest::LockOrientation(_) | MediaRequest::UnlockOrientation => Ok(()),
        };

        if let Err(err) = result {
            tracing::warn!(?request, error = %err, "media request failed");
        }
    }

    fn attach_media(self: &Arc<Self>, provider: &Arc<MediaProvider>) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        self.detach_media(None);

        let media_host = provider.host();
        let mut listeners = Vec::new();
        for event_type in STATE_EVENTS {
            let weak = Arc::downgrade(self);
            let kind = event_type.clone();
            listeners.push(doc.listen(media_host, event_type, move |_| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match kind {
                    EventType::CanPlay => inner.queue.start(),
                    EventType::Emptied => inner.queue.stop(),
                    _ => {}
                }
                inner.publish();
            }));
        }

        let weak = Arc::downgrade(self);
        let disconnect = doc.on_next_disconnect(media_host, move |node| {
            if let Some(inner) = weak.upgrade() {
                inner.detach_media(Some(node));
            }
        });

        *self.media.write() = Some(AttachedMedia {
            provider: Arc::downgrade(provider),
            host: media_host,
            listeners,
            disconnect,
        });
        tracing::debug!(controller = ?self.host, media = ?media_host, "media attached");

        self.publish();
        if provider.can_play() {
            self.queue.start();
        }
    }

    /// Drop the attached engine. With `only`, detach only if that node is
    /// the attached engine's host.
    fn detach_media(&self, only: Option<NodeId>) {
        let attached = {
            let mut media = self.media.write();
            let is_target = match (media.as_ref(), only) {
                (Some(attached), Some(node)) => attached.host == node,
                _ => true,
            };
            if !is_target {
                return;
            }
            media.take()
        };
        let Some(attached) = attached else {
            return;
        };

        self.queue.stop();
        if let Some(doc) = self.doc.upgrade() {
            for id in attached.listeners {
                doc.remove_event_listener(id);
            }
            doc.remove_lifecycle(attached.disconnect);
        }
        tracing::debug!(controller = ?self.host, media = ?attached.host, "media detached");
        self.publish();
    }

    /// Push the engine state to consumers and the store.
    fn publish(&self) {
        let state = self.media().map(|media| media.state()).unwrap_or_default();
        if state != self.state.value() {
            self.state.set_value(state.clone());
        }
        self.store.batch(|store| {
            for (field, value) in state.fields() {
                store.set(field, value);
            }
        });
    }
}

impl Drop for MediaController {
    fn drop(&mut self) {
        self.inner.detach_media(None);
        self.inner.queue.destroy();
        if let Some(doc) = self.inner.doc.upgrade() {
            for id in self.inner.listeners.lock().drain(..) {
                doc.remove_event_listener(id);
            }
        }
    }
}

impl std::fmt::Debug for MediaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaController")
            .field("host", &self.inner.host)
            .field("queue", &self.inner.queue)
            .field("media", &self.inner.media().map(|m| m.host()))
            .finish()
    }
}
