//! Query syntax tree.

use indexmap::IndexSet;
use std::fmt;

/// Literal on the right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Text(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => ":",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        };
        f.write_str(op)
    }
}

/// Boolean expression over store fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Constant false.
    Never,
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    /// Bare field, true when the field's value is truthy.
    Field(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Native media query text, handed to the media matcher.
    Media(String),
    /// Clause that failed to parse.
    Invalid,
}

impl Expr {
    fn collect_fields(&self, out: &mut IndexSet<String>) {
        match self {
            Expr::Compare { field, .. } | Expr::Field(field) => {
                out.insert(field.clone());
            }
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Expr::Never | Expr::Media(_) | Expr::Invalid => {}
        }
    }

    fn has_media(&self) -> bool {
        match self {
            Expr::Media(_) => true,
            Expr::Not(inner) => inner.has_media(),
            Expr::And(items) | Expr::Or(items) => items.iter().any(Expr::has_media),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Never => f.write_str("never"),
            Expr::Compare { field, op, value } => write!(f, "({} {} {})", field, op, value),
            Expr::Field(field) => write!(f, "({})", field),
            Expr::Not(inner) => write!(f, "not {}", inner),
            Expr::And(items) | Expr::Or(items) => {
                let joiner = if matches!(self, Expr::And(_)) { " and " } else { " or " };
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Expr::Media(query) => write!(f, "@media {}", query),
            Expr::Invalid => f.write_str("<invalid>"),
        }
    }
}

/// Compiled query: clauses OR'd together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub clauses: Vec<Expr>,
}

impl Query {
    /// Every field name referenced by the query, in order of appearance.
    pub fn fields(&self) -> IndexSet<String> {
        let mut fields = IndexSet::new();
        for clause in &self.clauses {
            clause.collect_fields(&mut fields);
        }
        fields
    }

    /// Whether any clause depends on the native media matcher.
    pub fn has_media(&self) -> bool {
        self.clauses.iter().any(Expr::has_media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_deduplicated_in_order() {
        let query = Query {
            clauses: vec![
                Expr::And(vec![
                    Expr::Field("paused".into()),
                    Expr::Compare {
                        field: "width".into(),
                        op: CompareOp::Lt,
                        value: Literal::Number(400.0),
                    },
                ]),
                Expr::Not(Box::new(Expr::Field("paused".into()))),
                Expr::Media("(hover)".into()),
            ],
        };
        let fields: Vec<_> = query.fields().into_iter().collect();
        assert_eq!(fields, vec!["paused".to_string(), "width".to_string()]);
        assert!(query.has_media());
    }

    #[test]
    fn test_display() {
        let expr = Expr::Or(vec![
            Expr::Field("ended".into()),
            Expr::Not(Box::new(Expr::Compare {
                field: "orientation".into(),
                op: CompareOp::Eq,
                value: Literal::Text("portrait".into()),
            })),
        ]);
        assert_eq!(expr.to_string(), "((ended) or not (orientation : \"portrait\"))");
    }
}
