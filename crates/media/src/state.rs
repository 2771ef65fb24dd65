//! Observable player state.

use derive_more::Display;
use once_cell::sync::Lazy;
use player_query::StateValue;
use serde::{Deserialize, Serialize};

/// Readiness of a playback engine.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaReadyState {
    /// No information about media.
    #[default]
    #[display("have-nothing")]
    HaveNothing,
    /// Metadata available.
    #[display("have-metadata")]
    HaveMetadata,
    /// Enough data for playback.
    #[display("have-enough-data")]
    HaveEnoughData,
}

/// Snapshot of a player's state, shared with controls through the
/// [`MEDIA_STATE`] context and mirrored into a query store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MediaState {
    pub paused: bool,
    pub volume: f64,
    pub muted: bool,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub playback_rate: f64,
    pub ready_state: MediaReadyState,
    pub can_play: bool,
    pub started: bool,
    pub ended: bool,
}

impl MediaState {
    /// State of a player with no engine attached.
    pub fn idle() -> Self {
        Self {
            paused: true,
            volume: 1.0,
            muted: false,
            current_time: 0.0,
            duration: None,
            playback_rate: 1.0,
            ready_state: MediaReadyState::HaveNothing,
            can_play: false,
            started: false,
            ended: false,
        }
    }

    /// Store fields, named as queries refer to them.
    pub fn fields(&self) -> Vec<(&'static str, StateValue)> {
        vec![
            ("paused", self.paused.into()),
            ("volume", self.volume.into()),
            ("muted", self.muted.into()),
            ("current-time", self.current_time.into()),
            ("duration", self.duration.into()),
            ("playback-rate", self.playback_rate.into()),
            ("ready-state", self.ready_state.to_string().into()),
            ("can-play", self.can_play.into()),
            ("started", self.started.into()),
            ("ended", self.ended.into()),
        ]
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Persisted `{ "volume": number, "muted": boolean }` snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub volume: f64,
    pub muted: bool,
}

/// Context carrying the nearest controller's [`MediaState`].
pub static MEDIA_STATE: Lazy<context::Context<MediaState>> =
    Lazy::new(|| context::Context::new(MediaState::idle));
