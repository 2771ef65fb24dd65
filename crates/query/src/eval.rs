//! Query interpreter.

use crate::ast::{CompareOp, Expr, Literal, Query};
use crate::store::{StateValue, Store};
use css_parser::MediaMatcher;

/// Evaluate a compiled query against live store values. Clauses are OR'd;
/// a query without clauses is false.
pub fn evaluate(query: &Query, store: &Store, media: Option<&dyn MediaMatcher>) -> bool {
    query
        .clauses
        .iter()
        .any(|clause| evaluate_expr(clause, store, media))
}

/// Evaluate a single expression. An expression that reads a field the
/// store does not have is false as a whole, even under `not`.
pub fn evaluate_expr(expr: &Expr, store: &Store, media: Option<&dyn MediaMatcher>) -> bool {
    resolve(expr, store, media).unwrap_or(false)
}

/// `None` when the expression references an unknown field.
fn resolve(expr: &Expr, store: &Store, media: Option<&dyn MediaMatcher>) -> Option<bool> {
    Some(match expr {
        Expr::Never | Expr::Invalid => false,
        Expr::Field(field) => store.get(field)?.is_truthy(),
        Expr::Compare { field, op, value } => compare(&store.get(field)?, *op, value),
        Expr::Not(inner) => !resolve(inner, store, media)?,
        Expr::And(items) => {
            let mut all = true;
            for item in items {
                all &= resolve(item, store, media)?;
            }
            all
        }
        Expr::Or(items) => {
            let mut any = false;
            for item in items {
                any |= resolve(item, store, media)?;
            }
            any
        }
        Expr::Media(query) => media.is_some_and(|matcher| matcher.matches(query)),
    })
}

fn compare(current: &StateValue, op: CompareOp, literal: &Literal) -> bool {
    match op {
        CompareOp::Eq => loosely_equal(current, literal),
        CompareOp::Ne => !loosely_equal(current, literal),
        CompareOp::Lt | CompareOp::Gt | CompareOp::Le | CompareOp::Ge => {
            let (Some(lhs), Some(rhs)) = (current.as_number(), literal_number(literal)) else {
                return false;
            };
            match op {
                CompareOp::Lt => lhs < rhs,
                CompareOp::Gt => lhs > rhs,
                CompareOp::Le => lhs <= rhs,
                _ => lhs >= rhs,
            }
        }
    }
}

fn literal_number(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Number(n) => Some(*n),
        Literal::Text(s) => s.trim().parse().ok(),
        Literal::Bool(_) => None,
    }
}

fn loosely_equal(current: &StateValue, literal: &Literal) -> bool {
    match (current, literal) {
        (StateValue::Null, _) => false,
        (StateValue::Number(n), Literal::Number(m)) => n == m,
        (StateValue::Number(n), Literal::Text(s)) => s.trim().parse::<f64>().is_ok_and(|m| *n == m),
        (StateValue::Text(s), Literal::Number(m)) => s.trim().parse::<f64>().is_ok_and(|n| n == *m),
        (StateValue::Text(s), Literal::Text(t)) => s == t,
        (StateValue::Bool(b), Literal::Bool(c)) => b == c,
        (StateValue::Bool(b), Literal::Text(s)) | (StateValue::Text(s), Literal::Bool(b)) => {
            s.parse::<bool>().is_ok_and(|parsed| parsed == *b)
        }
        (StateValue::Bool(_), Literal::Number(_)) | (StateValue::Number(_), Literal::Bool(_)) => false,
    }
}
