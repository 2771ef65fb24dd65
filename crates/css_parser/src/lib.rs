//! Media query support.
//!
//! This crate parses CSS media query lists using cssparser and evaluates
//! them against a [`MediaContext`]. [`MediaEnvironment`] is the live,
//! watchable matcher that `@media` clauses of player queries delegate to.

pub mod environment;
pub mod media;
pub mod parser;
pub mod values;

pub use environment::{MediaEnvironment, MediaMatcher, MediaWatcher};
pub use media::{
    MediaContext, MediaFeature, MediaQuery, MediaQueryList, MediaType, PointerType, RangePrefix,
};
pub use parser::{parse_media_query_list, CssParseError};
pub use values::FeatureValue;
