//! Declarative player queries.
//!
//! A small media-query-like language evaluated against live player state:
//!
//! ```text
//! (width < 400) and (orientation: "portrait"), @media (hover), never
//! ```
//!
//! Queries compile to an [`Expr`] tree, evaluate against a [`Store`] and are
//! kept current by a [`QueryList`], which re-evaluates only when a field the
//! query references changes.

pub mod ast;
pub mod eval;
pub mod parser;
pub mod query_list;
pub mod store;

pub use ast::{CompareOp, Expr, Literal, Query};
pub use css_parser::MediaMatcher;
pub use eval::{evaluate, evaluate_expr};
pub use parser::{parse_query, try_parse_query, QueryError, QueryParseError};
pub use query_list::QueryList;
pub use store::{StateValue, Store, SubscriptionId};
