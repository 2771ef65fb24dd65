//! Playback engine stand-in.
//!
//! A [`MediaProvider`] lives on a host node and plays the part of a native
//! media element: it owns playback state, fires notification events
//! (`play`, `pause`, `volume-change`, ...) on its host and announces itself
//! to controllers and sync containers above it with a bubbling
//! `media-provider-connect` event whenever the host connects.

use crate::state::{MediaReadyState, MediaState};
use dom::{
    Document, DocumentRef, ElementRegistration, Event, EventDetail, EventType, LifecycleBinding,
    NodeId,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// Slowest and fastest supported playback rates.
pub const MIN_PLAYBACK_RATE: f64 = 0.0625;
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Media error.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("Not ready")]
    NotReady,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Playback engine attached to a host node.
#[derive(Debug)]
pub struct MediaProvider {
    doc: Weak<Document>,
    host: NodeId,
    /// Ready state.
    ready_state: RwLock<MediaReadyState>,
    /// Paused flag.
    paused: RwLock<bool>,
    /// Whether playback has started since the last load.
    started: RwLock<bool>,
    /// Ended flag.
    ended: RwLock<bool>,
    /// Current time in seconds.
    current_time: RwLock<f64>,
    /// Duration in seconds.
    duration: RwLock<Option<f64>>,
    /// Playback rate.
    playback_rate: RwLock<f64>,
    /// Volume.
    volume: RwLock<f64>,
    /// Muted flag.
    muted: RwLock<bool>,
    binding: Mutex<Option<LifecycleBinding>>,
}

impl MediaProvider {
    /// Create a provider on `host`. It announces itself every time the host
    /// connects, including right away if the host is already connected.
    pub fn attach(doc: &DocumentRef, host: NodeId) -> Arc<Self> {
        let provider = Arc::new(Self {
            doc: Arc::downgrade(doc),
            host,
            ready_state: RwLock::new(MediaReadyState::HaveNothing),
            paused: RwLock::new(true),
            started: RwLock::new(false),
            ended: RwLock::new(false),
            current_time: RwLock::new(0.0),
            duration: RwLock::new(None),
            playback_rate: RwLock::new(1.0),
            volume: RwLock::new(1.0),
            muted: RwLock::new(false),
            binding: Mutex::new(None),
        });

        let weak = Arc::downgrade(&provider);
        let binding = doc.bind_lifecycle(
            host,
            move |_| {
                if let Some(provider) = weak.upgrade() {
                    provider.announce();
                }
            },
            |_| {},
        );
        *provider.binding.lock() = Some(binding);
        provider
    }

    fn announce(self: &Arc<Self>) {
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        let handle: Arc<dyn std::any::Any + Send + Sync> = self.clone();
        let mut event = Event::with_detail(
            EventType::MediaProviderConnect,
            EventDetail::Element(ElementRegistration {
                element: self.host,
                handle,
                owner: None,
            }),
        );
        doc.dispatch_event(self.host, &mut event);

        let owner = match &event.detail {
            EventDetail::Element(registration) => registration.owner,
            _ => None,
        };
        tracing::debug!(host = ?self.host, ?owner, "media provider connected");
    }

    /// Host node of the engine.
    pub fn host(&self) -> NodeId {
        self.host
    }

    fn emit(&self, event_type: EventType, detail: EventDetail) {
        if let Some(doc) = self.doc.upgrade() {
            let mut event = Event::with_detail(event_type, detail);
            doc.dispatch_event(self.host, &mut event);
        }
    }

    fn emit_volume(&self) {
        let detail = EventDetail::Volume {
            volume: self.volume(),
            muted: self.muted(),
        };
        self.emit(EventType::VolumeChange, detail);
    }

    // Loading

    /// Media finished loading; the engine can now play.
    pub fn load(&self, duration: f64) {
        *self.duration.write() = Some(duration.max(0.0));
        *self.current_time.write() = 0.0;
        *self.started.write() = false;
        *self.ended.write() = false;
        *self.ready_state.write() = MediaReadyState::HaveEnoughData;
        self.emit(EventType::CanPlay, EventDetail::Number(duration));
    }

    /// Drop the loaded media.
    pub fn unload(&self) {
        let was_playing = !self.paused();
        *self.ready_state.write() = MediaReadyState::HaveNothing;
        *self.paused.write() = true;
        *self.duration.write() = None;
        *self.current_time.write() = 0.0;
        if was_playing {
            self.emit(EventType::Pause, EventDetail::None);
        }
        self.emit(EventType::Emptied, EventDetail::None);
    }

    pub fn ready_state(&self) -> MediaReadyState {
        *self.ready_state.read()
    }

    pub fn can_play(&self) -> bool {
        self.ready_state() == MediaReadyState::HaveEnoughData
    }

    // Playback

    /// Play the media.
    pub fn play(&self) -> Result<(), MediaError> {
        if !self.can_play() {
            return Err(MediaError::NotReady);
        }
        if !self.paused() {
            return Ok(());
        }
        if self.ended() {
            *self.current_time.write() = 0.0;
        }
        *self.paused.write() = false;
        *self.ended.write() = false;
        *self.started.write() = true;
        self.emit(EventType::Play, EventDetail::None);
        Ok(())
    }

    /// Pause the media.
    pub fn pause(&self) {
        if self.paused() {
            return;
        }
        *self.paused.write() = true;
        self.emit(EventType::Pause, EventDetail::None);
    }

    pub fn paused(&self) -> bool {
        *self.paused.read()
    }

    pub fn ended(&self) -> bool {
        *self.ended.read()
    }

    pub fn started(&self) -> bool {
        *self.started.read()
    }

    /// Seek to `time` seconds, clamped to the media duration.
    pub fn seek(&self, time: f64) -> Result<(), MediaError> {
        if !self.can_play() {
            return Err(MediaError::NotReady);
        }
        if !time.is_finite() {
            return Err(MediaError::InvalidValue(format!("seek time {}", time)));
        }
        let end = self.duration().unwrap_or(f64::MAX);
        let time = time.clamp(0.0, end);
        *self.current_time.write() = time;
        *self.ended.write() = false;
        self.emit(EventType::Seeked, EventDetail::Number(time));
        Ok(())
    }

    pub fn current_time(&self) -> f64 {
        *self.current_time.read()
    }

    pub fn duration(&self) -> Option<f64> {
        *self.duration.read()
    }

    /// Advance the playhead by `elapsed` wall-clock seconds.
    pub fn advance(&self, elapsed: f64) {
        if self.paused() || elapsed <= 0.0 {
            return;
        }
        let rate = self.playback_rate();
        let time = self.current_time() + elapsed * rate;
        match self.duration() {
            Some(duration) if time >= duration => {
                *self.current_time.write() = duration;
                *self.ended.write() = true;
                *self.paused.write() = true;
                self.emit(EventType::Pause, EventDetail::None);
                self.emit(EventType::Ended, EventDetail::None);
            }
            _ => *self.current_time.write() = time,
        }
    }

    pub fn playback_rate(&self) -> f64 {
        *self.playback_rate.read()
    }

    /// Set playback rate, clamped to the supported range.
    pub fn set_playback_rate(&self, rate: f64) -> Result<(), MediaError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(MediaError::InvalidValue(format!("playback rate {}", rate)));
        }
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if rate == self.playback_rate() {
            return Ok(());
        }
        *self.playback_rate.write() = rate;
        self.emit(EventType::RateChange, EventDetail::Number(rate));
        Ok(())
    }

    // Volume

    pub fn volume(&self) -> f64 {
        *self.volume.read()
    }

    /// Set volume.
    pub fn set_volume(&self, volume: f64) -> Result<(), MediaError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(MediaError::InvalidValue(format!("volume {}", volume)));
        }
        if volume == self.volume() {
            return Ok(());
        }
        *self.volume.write() = volume;
        self.emit_volume();
        Ok(())
    }

    pub fn muted(&self) -> bool {
        *self.muted.read()
    }

    /// Set muted.
    pub fn set_muted(&self, muted: bool) {
        if muted == self.muted() {
            return;
        }
        *self.muted.write() = muted;
        self.emit_volume();
    }

    /// Snapshot of the engine state.
    pub fn state(&self) -> MediaState {
        MediaState {
            paused: self.paused(),
            volume: self.volume(),
            muted: self.muted(),
            current_time: self.current_time(),
            duration: self.duration(),
            playback_rate: self.playback_rate(),
            ready_state: self.ready_state(),
            can_play: self.can_play(),
            started: self.started(),
            ended: self.ended(),
        }
    }
}

impl Drop for MediaProvider {
    fn drop(&mut self) {
        if let (Some(doc), Some(binding)) = (self.doc.upgrade(), self.binding.get_mut().take()) {
            doc.unbind_lifecycle(binding);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doc: &DocumentRef, node: NodeId, types: &[EventType]) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for event_type in types {
            let log = log.clone();
            doc.listen(node, event_type.clone(), move |event| {
                log.lock().push(event.event_type.as_str().to_string());
            });
        }
        log
    }

    fn mounted() -> (DocumentRef, Arc<MediaProvider>) {
        let doc = Document::new();
        let host = doc.create_element("media-provider");
        doc.append_child(doc.root(), host).unwrap();
        let provider = MediaProvider::attach(&doc, host);
        (doc, provider)
    }

    #[test]
    fn test_play_requires_ready_engine() {
        let (_doc, provider) = mounted();
        assert_eq!(provider.play(), Err(MediaError::NotReady));
        assert!(provider.paused());

        provider.load(10.0);
        provider.play().unwrap();
        assert!(!provider.paused());
        assert!(provider.started());
    }

    #[test]
    fn test_notifications_fire_only_on_change() {
        let (doc, provider) = mounted();
        let log = record(
            &doc,
            provider.host(),
            &[EventType::Play, EventType::Pause, EventType::VolumeChange, EventType::CanPlay],
        );

        provider.load(10.0);
        provider.play().unwrap();
        provider.play().unwrap();
        provider.set_volume(0.5).unwrap();
        provider.set_volume(0.5).unwrap();
        provider.set_muted(true);
        provider.pause();
        provider.pause();

        assert_eq!(
            *log.lock(),
            vec!["can-play", "play", "volume-change", "volume-change", "pause"]
        );
    }

    #[test]
    fn test_volume_and_rate_validation() {
        let (_doc, provider) = mounted();
        assert!(provider.set_volume(1.5).is_err());
        assert!(provider.set_volume(-0.1).is_err());
        assert!(provider.set_playback_rate(0.0).is_err());
        provider.set_playback_rate(100.0).unwrap();
        assert_eq!(provider.playback_rate(), MAX_PLAYBACK_RATE);
    }

    #[test]
    fn test_seek_clamps_and_advance_ends() {
        let (_doc, provider) = mounted();
        provider.load(5.0);
        provider.seek(99.0).unwrap();
        assert_eq!(provider.current_time(), 5.0);

        provider.seek(4.0).unwrap();
        provider.play().unwrap();
        provider.advance(2.0);
        assert!(provider.ended());
        assert!(provider.paused());
        assert_eq!(provider.current_time(), 5.0);
    }

    #[test]
    fn test_announces_on_connect() {
        let doc = Document::new();
        let container = doc.create_element("div");
        let host = doc.create_element("media-provider");
        doc.append_child(doc.root(), container).unwrap();
        doc.append_child(container, host).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.listen(container, EventType::MediaProviderConnect, move |event| {
            if let EventDetail::Element(registration) = &event.detail {
                let provider = registration.handle::<MediaProvider>().map(|p| p.host());
                sink.lock().push(provider);
            }
        });

        let provider = MediaProvider::attach(&doc, host);
        assert_eq!(*seen.lock(), vec![Some(host)]);

        doc.remove_child(host);
        doc.append_child(container, host).unwrap();
        assert_eq!(seen.lock().len(), 2);
        drop(provider);
    }
}
