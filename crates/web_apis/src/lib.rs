//! Platform services used by the player components.
//!
//! - Storage API (localStorage)
//! - Screen Orientation API

pub mod screen;
pub mod storage;

pub use screen::{OrientationLock, OrientationType, ScreenOrientation};
pub use storage::{DisabledStorage, LocalStorage, MemoryStorage, Storage, StorageError};
