//! Media feature values.

use std::fmt;

/// Value of a media feature, e.g. the `768px` in `(min-width: 768px)`.
///
/// Lengths and resolutions are normalized to CSS pixels and dots per pixel
/// when parsed, so matching never deals with units.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureValue {
    /// Keyword or quoted string, e.g. `portrait`.
    Keyword(String),
    /// Unitless number.
    Number(f32),
    /// Length in CSS pixels.
    Length(f32),
    /// Ratio such as `16/9`.
    Ratio(f32, f32),
    /// Resolution in dots per pixel.
    Resolution(f32),
    /// Dimension whose unit needs layout context (`em`, `vw`, ...).
    Unresolved(f32, String),
}

impl FeatureValue {
    /// Classify a dimension token by its unit.
    pub fn dimension(value: f32, unit: &str) -> Self {
        let px_per_unit = match unit.to_ascii_lowercase().as_str() {
            "px" => 1.0,
            "in" => 96.0,
            "cm" => 96.0 / 2.54,
            "mm" => 96.0 / 25.4,
            "pt" => 96.0 / 72.0,
            "pc" => 16.0,
            "dppx" | "x" => return FeatureValue::Resolution(value),
            "dpi" => return FeatureValue::Resolution(value / 96.0),
            "dpcm" => return FeatureValue::Resolution(value * 2.54 / 96.0),
            _ => return FeatureValue::Unresolved(value, unit.to_string()),
        };
        FeatureValue::Length(value * px_per_unit)
    }

    pub fn keyword(&self) -> Option<&str> {
        match self {
            FeatureValue::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    /// Length in pixels. A bare `0` is a length.
    pub fn length(&self) -> Option<f32> {
        match *self {
            FeatureValue::Length(px) => Some(px),
            FeatureValue::Number(n) if n == 0.0 => Some(0.0),
            _ => None,
        }
    }

    /// Ratio as a quotient; a bare number `n` means `n/1`.
    pub fn ratio(&self) -> Option<f32> {
        match *self {
            FeatureValue::Ratio(_, d) if d == 0.0 => None,
            FeatureValue::Ratio(n, d) => Some(n / d),
            FeatureValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn resolution(&self) -> Option<f32> {
        match *self {
            FeatureValue::Resolution(dppx) => Some(dppx),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Keyword(keyword) => f.write_str(keyword),
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Length(px) => write!(f, "{}px", px),
            FeatureValue::Ratio(n, d) => write!(f, "{}/{}", n, d),
            FeatureValue::Resolution(dppx) => write!(f, "{}dppx", dppx),
            FeatureValue::Unresolved(n, unit) => write!(f, "{}{}", n, unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths_normalize_to_px() {
        assert_eq!(FeatureValue::dimension(16.0, "px"), FeatureValue::Length(16.0));
        assert_eq!(FeatureValue::dimension(1.0, "IN"), FeatureValue::Length(96.0));
        assert_eq!(FeatureValue::dimension(12.0, "pt").length(), Some(16.0));
        assert_eq!(FeatureValue::Number(0.0).length(), Some(0.0));
        assert_eq!(FeatureValue::Number(3.0).length(), None);
    }

    #[test]
    fn test_relative_units_stay_unresolved() {
        let em = FeatureValue::dimension(2.0, "em");
        assert_eq!(em, FeatureValue::Unresolved(2.0, "em".into()));
        assert_eq!(em.length(), None);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(FeatureValue::Ratio(16.0, 8.0).ratio(), Some(2.0));
        assert_eq!(FeatureValue::Ratio(1.0, 0.0).ratio(), None);
        assert_eq!(FeatureValue::Number(1.5).ratio(), Some(1.5));
    }

    #[test]
    fn test_resolution_units() {
        assert_eq!(FeatureValue::dimension(2.0, "x").resolution(), Some(2.0));
        assert_eq!(FeatureValue::dimension(192.0, "dpi").resolution(), Some(2.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(FeatureValue::Length(16.5).to_string(), "16.5px");
        assert_eq!(FeatureValue::Ratio(16.0, 9.0).to_string(), "16/9");
        assert_eq!(FeatureValue::Keyword("portrait".into()).to_string(), "portrait");
    }
}
