//! Common utilities and types shared across the media player core.

pub mod error;

pub use error::{PlayerError, PlayerResult};
