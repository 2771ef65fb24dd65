//! Media playback components.
//!
//! This crate provides:
//! - A playback engine stand-in ([`MediaProvider`])
//! - Request events and the imperative [`MediaRemoteControl`] facade
//! - A coalescing [`RequestQueue`] owned by each [`MediaController`]
//! - Cross-instance synchronization ([`MediaSync`])

pub mod controller;
pub mod provider;
pub mod queue;
pub mod remote;
pub mod request;
pub mod state;
pub mod sync;

pub use controller::MediaController;
pub use provider::{MediaError, MediaProvider};
pub use queue::{QueuedAction, RequestQueue};
pub use remote::MediaRemoteControl;
pub use request::{MediaRequest, RequestKey};
pub use state::{MediaReadyState, MediaState, VolumeSnapshot, MEDIA_STATE};
pub use sync::{GuardCell, GuardToken, MediaSync, SyncConfig, SyncGuard, SyncRegistry};
