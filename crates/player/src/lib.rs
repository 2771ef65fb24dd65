//! Media player core - headless media player components.
//!
//! This crate assembles the player components into a page:
//! - Context discovery between controllers and controls
//! - Request queueing and remote control
//! - Cross-instance playback and volume synchronization
//! - Declarative player queries

pub mod config;
pub mod page;

pub use config::PlayerConfig;
pub use page::{PlayerInstance, PlayerPage};

/// Player version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
