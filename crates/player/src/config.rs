//! Player page configuration.

use common::{PlayerError, PlayerResult};
use player_media::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Player page configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Independent players mounted side by side.
    pub players: usize,
    /// Viewport size in CSS pixels; portrait when taller than wide.
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_pixel_ratio: f64,
    pub prefer_dark_mode: bool,
    pub prefer_reduced_motion: bool,
    /// Touch device with a lockable screen orientation.
    pub orientation_supported: bool,
    /// Disabled storage refuses reads and writes, as in a privacy mode.
    pub local_storage_enabled: bool,
    pub storage_origin: String,
    pub sync: SyncConfig,
    /// Queries tracked on every player.
    pub queries: Vec<String>,
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phone-sized page with touch-style orientation support.
    pub fn mobile() -> Self {
        Self {
            viewport_width: 375,
            viewport_height: 812,
            device_pixel_ratio: 3.0,
            orientation_supported: true,
            ..Self::default()
        }
    }

    /// Players that share nothing with each other.
    pub fn isolated() -> Self {
        Self {
            sync: SyncConfig::default(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PlayerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> PlayerResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> PlayerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations a page cannot be built from.
    pub fn validate(&self) -> PlayerResult<()> {
        if self.players == 0 {
            return Err(PlayerError::invalid("at least one player is required"));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(PlayerError::invalid("viewport must not be empty"));
        }
        for query in &self.queries {
            player_query::try_parse_query(query)
                .map_err(|err| PlayerError::parse(format!("query '{}': {}", query, err)))?;
        }
        Ok(())
    }

    pub fn with_players(mut self, players: usize) -> Self {
        self.players = players;
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Track another query on every player.
    pub fn with_query(mut self, query: &str) -> Self {
        self.queries.push(query.to_string());
        self
    }

    pub fn with_local_storage(mut self, enabled: bool) -> Self {
        self.local_storage_enabled = enabled;
        self
    }

    pub fn with_orientation_support(mut self, supported: bool) -> Self {
        self.orientation_supported = supported;
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            players: 2,
            viewport_width: 1280,
            viewport_height: 720,
            device_pixel_ratio: 1.0,
            prefer_dark_mode: false,
            prefer_reduced_motion: false,
            orientation_supported: false,
            local_storage_enabled: true,
            storage_origin: "https://player.local".to_string(),
            sync: SyncConfig::all(),
            queries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.players, 2);
        assert_eq!(config.viewport_width, 1280);
        assert!(config.sync.single_playback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mobile_config() {
        let config = PlayerConfig::mobile();
        assert_eq!(config.viewport_width, 375);
        assert_eq!(config.device_pixel_ratio, 3.0);
        assert!(config.orientation_supported);
    }

    #[test]
    fn test_isolated_config() {
        let config = PlayerConfig::isolated();
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_config_builder() {
        let config = PlayerConfig::new()
            .with_viewport(1920, 1080)
            .with_players(4)
            .with_query("(paused)");

        assert_eq!(config.viewport_width, 1920);
        assert_eq!(config.players, 4);
        assert_eq!(config.queries, vec!["(paused)".to_string()]);
    }

    #[test]
    fn test_json_defaults_and_round_trip() {
        let config = PlayerConfig::from_json(r#"{"players": 3, "sync": {"shared_volume": true}}"#).unwrap();
        assert_eq!(config.players, 3);
        assert!(config.sync.shared_volume);
        assert!(!config.sync.single_playback);
        assert_eq!(config.viewport_height, 720);

        let json = config.to_json().unwrap();
        assert_eq!(PlayerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(PlayerConfig::from_json("{\"players\": 0}").is_err());
        assert!(PlayerConfig::from_json("not json").is_err());

        let err = PlayerConfig::new().with_query("(width: 2em)").validate().unwrap_err();
        assert!(matches!(err, PlayerError::Parse(_)));
    }
}
