//! Imperative facade for media controls.

use crate::request::MediaRequest;
use dom::{Document, DocumentRef, Event, NodeId};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Issues media requests from a control's host node.
///
/// Every method dispatches a request event and returns whether a controller
/// claimed it. `trigger` is the event that caused the call (typically a
/// click) and is carried along for provenance only.
#[derive(Debug)]
pub struct MediaRemoteControl {
    doc: Weak<Document>,
    target: RwLock<NodeId>,
}

impl MediaRemoteControl {
    pub fn new(doc: &DocumentRef, target: NodeId) -> Self {
        Self {
            doc: Arc::downgrade(doc),
            target: RwLock::new(target),
        }
    }

    pub fn target(&self) -> NodeId {
        *self.target.read()
    }

    /// Dispatch future requests from a different node.
    pub fn set_target(&self, target: NodeId) {
        *self.target.write() = target;
    }

    /// Dispatch a request. Returns `true` if a controller handled it.
    pub fn request(&self, request: MediaRequest, trigger: Option<Arc<Event>>) -> bool {
        let Some(doc) = self.doc.upgrade() else {
            return false;
        };
        let target = self.target();
        let mut event = request.to_event(trigger);
        doc.dispatch_event(target, &mut event);

        if !event.propagation_stopped {
            tracing::warn!(
                request = event.event_type.as_str(),
                ?target,
                "media request was not handled by any controller"
            );
        }
        event.propagation_stopped
    }

    pub fn play(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::Play, trigger)
    }

    pub fn pause(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::Pause, trigger)
    }

    pub fn toggle_paused(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::TogglePaused, trigger)
    }

    pub fn mute(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::Mute, trigger)
    }

    pub fn unmute(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::Unmute, trigger)
    }

    pub fn toggle_muted(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::ToggleMuted, trigger)
    }

    /// Seek to `time` seconds.
    pub fn seek(&self, time: f64, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::Seek(time), trigger)
    }

    pub fn change_volume(&self, volume: f64, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::ChangeVolume(volume), trigger)
    }

    pub fn change_playback_rate(&self, rate: f64, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::ChangePlaybackRate(rate), trigger)
    }

    /// Request a screen orientation lock such as `"landscape"`.
    pub fn lock_screen_orientation(&self, lock: &str, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::LockOrientation(lock.to_string()), trigger)
    }

    pub fn unlock_screen_orientation(&self, trigger: Option<Arc<Event>>) -> bool {
        self.request(MediaRequest::UnlockOrientation, trigger)
    }
}
