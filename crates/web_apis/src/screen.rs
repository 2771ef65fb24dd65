//! Screen Orientation API.
//!
//! Reading the orientation is passive and yields `None` when the platform
//! has no orientation support. Locking is an explicit request and fails with
//! [`PlayerError::Unsupported`] instead.

use common::{PlayerError, PlayerResult};
use derive_more::Display;
use parking_lot::RwLock;
use std::str::FromStr;

/// Current screen orientation.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OrientationType {
    #[display("portrait-primary")]
    PortraitPrimary,
    #[display("portrait-secondary")]
    PortraitSecondary,
    #[display("landscape-primary")]
    LandscapePrimary,
    #[display("landscape-secondary")]
    LandscapeSecondary,
}

impl OrientationType {
    pub fn is_portrait(&self) -> bool {
        matches!(
            self,
            OrientationType::PortraitPrimary | OrientationType::PortraitSecondary
        )
    }
}

/// Requested orientation lock.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OrientationLock {
    #[display("any")]
    Any,
    #[display("natural")]
    Natural,
    #[display("portrait")]
    Portrait,
    #[display("landscape")]
    Landscape,
    #[display("{_0}")]
    Exact(OrientationType),
}

impl OrientationLock {
    /// Whether `orientation` satisfies this lock.
    pub fn allows(&self, orientation: OrientationType) -> bool {
        match self {
            OrientationLock::Any => true,
            OrientationLock::Natural => orientation == OrientationType::PortraitPrimary,
            OrientationLock::Portrait => orientation.is_portrait(),
            OrientationLock::Landscape => !orientation.is_portrait(),
            OrientationLock::Exact(exact) => orientation == *exact,
        }
    }

    /// Orientation the screen turns to when locking from elsewhere.
    fn preferred(&self) -> Option<OrientationType> {
        match self {
            OrientationLock::Any => None,
            OrientationLock::Natural | OrientationLock::Portrait => {
                Some(OrientationType::PortraitPrimary)
            }
            OrientationLock::Landscape => Some(OrientationType::LandscapePrimary),
            OrientationLock::Exact(exact) => Some(*exact),
        }
    }
}

impl FromStr for OrientationLock {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(OrientationLock::Any),
            "natural" => Ok(OrientationLock::Natural),
            "portrait" => Ok(OrientationLock::Portrait),
            "landscape" => Ok(OrientationLock::Landscape),
            "portrait-primary" => Ok(OrientationLock::Exact(OrientationType::PortraitPrimary)),
            "portrait-secondary" => Ok(OrientationLock::Exact(OrientationType::PortraitSecondary)),
            "landscape-primary" => Ok(OrientationLock::Exact(OrientationType::LandscapePrimary)),
            "landscape-secondary" => {
                Ok(OrientationLock::Exact(OrientationType::LandscapeSecondary))
            }
            other => Err(PlayerError::invalid(format!("unknown orientation lock '{}'", other))),
        }
    }
}

#[derive(Debug)]
struct OrientationState {
    current: OrientationType,
    locked: Option<OrientationLock>,
}

/// Screen orientation of the page.
#[derive(Debug)]
pub struct ScreenOrientation {
    state: Option<RwLock<OrientationState>>,
}

impl ScreenOrientation {
    /// Orientation support with the screen in `current`.
    pub fn new(current: OrientationType) -> Self {
        Self {
            state: Some(RwLock::new(OrientationState {
                current,
                locked: None,
            })),
        }
    }

    /// A platform without orientation support.
    pub fn unsupported() -> Self {
        Self { state: None }
    }

    pub fn is_supported(&self) -> bool {
        self.state.is_some()
    }

    /// Current orientation, `None` without platform support.
    pub fn current(&self) -> Option<OrientationType> {
        self.state.as_ref().map(|state| state.read().current)
    }

    /// Active lock, if any.
    pub fn locked(&self) -> Option<OrientationLock> {
        self.state.as_ref().and_then(|state| state.read().locked)
    }

    /// Lock the orientation.
    pub fn lock(&self, lock: OrientationLock) -> PlayerResult<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| PlayerError::unsupported("screen orientation lock"))?;

        let mut state = state.write();
        if !lock.allows(state.current) {
            if let Some(preferred) = lock.preferred() {
                state.current = preferred;
            }
        }
        state.locked = Some(lock);
        tracing::debug!(%lock, current = %state.current, "screen orientation locked");
        Ok(())
    }

    /// Parse and apply a lock such as `"landscape"`.
    pub fn lock_str(&self, lock: &str) -> PlayerResult<()> {
        if !self.is_supported() {
            return Err(PlayerError::unsupported("screen orientation lock"));
        }
        self.lock(lock.parse()?)
    }

    /// Release the lock. A no-op without platform support.
    pub fn unlock(&self) {
        if let Some(state) = &self.state {
            state.write().locked = None;
        }
    }

    /// The device rotated. Ignored while locked to an incompatible
    /// orientation.
    pub fn rotate(&self, orientation: OrientationType) {
        if let Some(state) = &self.state {
            let mut state = state.write();
            if state.locked.map_or(true, |lock| lock.allows(orientation)) {
                state.current = orientation;
            }
        }
    }
}

impl Default for ScreenOrientation {
    fn default() -> Self {
        Self::new(OrientationType::LandscapePrimary)
    }
}
