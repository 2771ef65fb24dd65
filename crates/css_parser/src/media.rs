//! Media query model and matching.

use crate::values::FeatureValue;
use std::str::FromStr;

/// Media type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MediaType {
    #[default]
    All,
    Screen,
    Print,
    Unknown(String),
}

impl FromStr for MediaType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "all" => MediaType::All,
            "screen" => MediaType::Screen,
            "print" => MediaType::Print,
            other => MediaType::Unknown(other.to_string()),
        })
    }
}

impl MediaType {
    pub fn matches(&self, context: &MediaContext) -> bool {
        match self {
            MediaType::All => true,
            MediaType::Unknown(_) => false,
            media_type => *media_type == context.media_type,
        }
    }
}

/// Comparison a range feature name implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangePrefix {
    Exact,
    Min,
    Max,
}

/// A `(name: value)` condition.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaFeature {
    /// Feature name without its `min-`/`max-` prefix, lowercased.
    pub name: String,
    pub prefix: RangePrefix,
    pub value: Option<FeatureValue>,
}

impl MediaFeature {
    pub fn new(name: &str, value: Option<FeatureValue>) -> Self {
        let name = name.to_ascii_lowercase();
        let (prefix, name) = if let Some(base) = name.strip_prefix("min-") {
            (RangePrefix::Min, base.to_string())
        } else if let Some(base) = name.strip_prefix("max-") {
            (RangePrefix::Max, base.to_string())
        } else {
            (RangePrefix::Exact, name)
        };
        Self {
            name,
            prefix,
            value,
        }
    }

    pub fn matches(&self, context: &MediaContext) -> bool {
        let value = self.value.as_ref();
        match self.name.as_str() {
            "width" => self.in_range(value.and_then(FeatureValue::length), context.width, 0.5),
            "height" => self.in_range(value.and_then(FeatureValue::length), context.height, 0.5),
            "aspect-ratio" => {
                self.in_range(value.and_then(FeatureValue::ratio), context.aspect_ratio(), 0.01)
            }
            "resolution" => self.in_range(
                value.and_then(FeatureValue::resolution),
                context.device_pixel_ratio,
                0.01,
            ),
            // Discrete features take no prefix.
            _ if self.prefix != RangePrefix::Exact => false,
            _ => self.matches_discrete(value.and_then(FeatureValue::keyword), context),
        }
    }

    /// `(width)` alone is true for any non-zero width. A value that cannot
    /// be resolved never matches.
    fn in_range(&self, expected: Option<f32>, actual: f32, tolerance: f32) -> bool {
        match (&self.value, expected) {
            (None, _) => self.prefix == RangePrefix::Exact && actual != 0.0,
            (Some(_), None) => false,
            (Some(_), Some(expected)) => match self.prefix {
                RangePrefix::Exact => (actual - expected).abs() < tolerance,
                RangePrefix::Min => actual >= expected,
                RangePrefix::Max => actual <= expected,
            },
        }
    }

    fn matches_discrete(&self, keyword: Option<&str>, context: &MediaContext) -> bool {
        let keyword = keyword.map(str::to_ascii_lowercase);
        let keyword = keyword.as_deref();
        match (self.name.as_str(), keyword) {
            ("orientation", Some("portrait")) => !context.is_landscape(),
            ("orientation", Some("landscape")) => context.is_landscape(),
            ("prefers-color-scheme", Some("dark")) => context.prefers_dark,
            ("prefers-color-scheme", Some("light")) => !context.prefers_dark,
            ("prefers-reduced-motion", None | Some("reduce")) => context.prefers_reduced_motion,
            ("prefers-reduced-motion", Some("no-preference")) => !context.prefers_reduced_motion,
            ("hover", None | Some("hover")) => context.can_hover,
            ("hover", Some("none")) => !context.can_hover,
            ("pointer", None) => context.pointer != PointerType::None,
            ("pointer", Some(pointer)) => context.pointer.as_str() == pointer,
            (feature, _) => {
                tracing::trace!(feature, ?keyword, "media feature did not match");
                false
            }
        }
    }
}

/// One query of a list: `[not|only] [type] [and (feature)]*`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaQuery {
    pub media_type: Option<MediaType>,
    pub features: Vec<MediaFeature>,
    pub negated: bool,
}

impl MediaQuery {
    /// A query that never matches, standing in for unparsable input.
    pub fn not_all() -> Self {
        Self {
            media_type: Some(MediaType::All),
            features: Vec::new(),
            negated: true,
        }
    }

    pub fn matches(&self, context: &MediaContext) -> bool {
        let matched = self.media_type.as_ref().map_or(true, |t| t.matches(context))
            && self.features.iter().all(|feature| feature.matches(context));
        matched != self.negated
    }
}

/// Media query list. Matches when any query matches; an empty list matches
/// everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaQueryList {
    pub queries: Vec<MediaQuery>,
}

impl MediaQueryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, context: &MediaContext) -> bool {
        self.queries.is_empty() || self.queries.iter().any(|q| q.matches(context))
    }
}

/// Primary pointing device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerType {
    None,
    Coarse,
    #[default]
    Fine,
}

impl PointerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerType::None => "none",
            PointerType::Coarse => "coarse",
            PointerType::Fine => "fine",
        }
    }
}

/// What `@media` clauses are evaluated against.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaContext {
    /// Viewport width in CSS pixels.
    pub width: f32,
    /// Viewport height in CSS pixels.
    pub height: f32,
    pub device_pixel_ratio: f32,
    pub media_type: MediaType,
    pub prefers_dark: bool,
    pub prefers_reduced_motion: bool,
    pub can_hover: bool,
    pub pointer: PointerType,
}

impl Default for MediaContext {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            device_pixel_ratio: 1.0,
            media_type: MediaType::Screen,
            prefers_dark: false,
            prefers_reduced_motion: false,
            can_hover: true,
            pointer: PointerType::Fine,
        }
    }
}

impl MediaContext {
    /// Desktop screen with a mouse.
    pub fn screen(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Touch device: coarse pointer, no hover.
    pub fn touch(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            can_hover: false,
            pointer: PointerType::Coarse,
            ..Default::default()
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }
}
