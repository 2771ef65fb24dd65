//! Media request events.
//!
//! Controls never touch the engine. They dispatch a request event that
//! bubbles to the nearest controller; [`MediaRequest`] is the decoded form
//! of such an event.

use derive_more::Display;
use dom::{Event, EventDetail, EventType};
use std::sync::Arc;

/// Queue key a request coalesces under. Requests that affect the same piece
/// of state share a key, so only the latest of them survives in the queue.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum RequestKey {
    #[display("paused")]
    Paused,
    #[display("muted")]
    Muted,
    #[display("seek")]
    Seek,
    #[display("volume")]
    Volume,
    #[display("playback-rate")]
    PlaybackRate,
    #[display("orientation")]
    Orientation,
}

/// A command addressed to the nearest media controller.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaRequest {
    Play,
    Pause,
    TogglePaused,
    Mute,
    Unmute,
    ToggleMuted,
    Seek(f64),
    ChangeVolume(f64),
    ChangePlaybackRate(f64),
    LockOrientation(String),
    UnlockOrientation,
}

impl MediaRequest {
    pub fn event_type(&self) -> EventType {
        match self {
            MediaRequest::Play => EventType::MediaPlayRequest,
            MediaRequest::Pause => EventType::MediaPauseRequest,
            MediaRequest::TogglePaused => EventType::MediaTogglePausedRequest,
            MediaRequest::Mute => EventType::MediaMuteRequest,
            MediaRequest::Unmute => EventType::MediaUnmuteRequest,
            MediaRequest::ToggleMuted => EventType::MediaToggleMutedRequest,
            MediaRequest::Seek(_) => EventType::MediaSeekRequest,
            MediaRequest::ChangeVolume(_) => EventType::MediaVolumeChangeRequest,
            MediaRequest::ChangePlaybackRate(_) => EventType::MediaRateChangeRequest,
            MediaRequest::LockOrientation(_) => EventType::MediaOrientationLockRequest,
            MediaRequest::UnlockOrientation => EventType::MediaOrientationUnlockRequest,
        }
    }

    pub fn key(&self) -> RequestKey {
        match self {
            MediaRequest::Play | MediaRequest::Pause | MediaRequest::TogglePaused => {
                RequestKey::Paused
            }
            MediaRequest::Mute | MediaRequest::Unmute | MediaRequest::ToggleMuted => {
                RequestKey::Muted
            }
            MediaRequest::Seek(_) => RequestKey::Seek,
            MediaRequest::ChangeVolume(_) => RequestKey::Volume,
            MediaRequest::ChangePlaybackRate(_) => RequestKey::PlaybackRate,
            MediaRequest::LockOrientation(_) | MediaRequest::UnlockOrientation => {
                RequestKey::Orientation
            }
        }
    }

    fn detail(&self) -> EventDetail {
        match self {
            MediaRequest::Seek(value)
            | MediaRequest::ChangeVolume(value)
            | MediaRequest::ChangePlaybackRate(value) => EventDetail::Number(*value),
            MediaRequest::LockOrientation(lock) => EventDetail::Text(lock.clone()),
            _ => EventDetail::None,
        }
    }

    /// Build the request event, recording what caused it.
    pub fn to_event(&self, trigger: Option<Arc<Event>>) -> Event {
        Event::with_detail(self.event_type(), self.detail()).with_trigger(trigger)
    }

    /// Decode a request event. Returns `None` for other events and for
    /// requests missing their payload.
    pub fn from_event(event: &Event) -> Option<Self> {
        let request = match event.event_type {
            EventType::MediaPlayRequest => MediaRequest::Play,
            EventType::MediaPauseRequest => MediaRequest::Pause,
            EventType::MediaTogglePausedRequest => MediaRequest::TogglePaused,
            EventType::MediaMuteRequest => MediaRequest::Mute,
            EventType::MediaUnmuteRequest => MediaRequest::Unmute,
            EventType::MediaToggleMutedRequest => MediaRequest::ToggleMuted,
            EventType::MediaSeekRequest => MediaRequest::Seek(event.detail.as_number()?),
            EventType::MediaVolumeChangeRequest => {
                MediaRequest::ChangeVolume(event.detail.as_number()?)
            }
            EventType::MediaRateChangeRequest => {
                MediaRequest::ChangePlaybackRate(event.detail.as_number()?)
            }
            EventType::MediaOrientationLockRequest => {
                MediaRequest::LockOrientation(event.detail.as_text()?.to_string())
            }
            EventType::MediaOrientationUnlockRequest => MediaRequest::UnlockOrientation,
            _ => return None,
        };
        Some(request)
    }

    /// Every request event type, for controllers to listen on.
    pub fn event_types() -> [EventType; 11] {
        [
            EventType::MediaPlayRequest,
            EventType::MediaPauseRequest,
            EventType::MediaTogglePausedRequest,
            EventType::MediaMuteRequest,
            EventType::MediaUnmuteRequest,
            EventType::MediaToggleMutedRequest,
            EventType::MediaSeekRequest,
            EventType::MediaVolumeChangeRequest,
            EventType::MediaRateChangeRequest,
            EventType::MediaOrientationLockRequest,
            EventType::MediaOrientationUnlockRequest,
        ]
    }
}
