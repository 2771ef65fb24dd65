//! Query parser.
//!
//! Recursive descent over cssparser tokens:
//!
//! ```text
//! query  := clause ("," clause)*
//! clause := "never" | "@media" <media-query> | or
//! or     := and ("or" and)*
//! and    := unary ("and" unary)*
//! unary  := "not" unary | "(" or ")" | term
//! term   := field [op value]
//! ```
//!
//! Clauses are independent: one that fails to parse becomes
//! [`Expr::Invalid`] and the rest of the query still works.

use crate::ast::{CompareOp, Expr, Literal, Query};
use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};
use thiserror::Error;

/// Reason a clause was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QueryParseError {
    #[error("expected a field name")]
    ExpectedField,
    #[error("'{0}' is reserved and cannot name a field")]
    ReservedWord(String),
    #[error("expected a value")]
    InvalidValue,
    #[error("unsupported unit '{0}'")]
    UnsupportedUnit(String),
    #[error("@media requires a query")]
    EmptyMedia,
}

/// A clause that failed to parse, with its position in the source.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("clause {clause} at {line}:{column}: {message}")]
pub struct QueryError {
    pub clause: usize,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

type ParseResult<'i, T> = Result<T, ParseError<'i, QueryParseError>>;

const RESERVED: &[&str] = &["and", "or", "not"];

/// Parse a query leniently. Malformed clauses become [`Expr::Invalid`].
pub fn parse_query(source: &str) -> Query {
    let clauses = parse_clauses(source)
        .into_iter()
        .map(|clause| {
            clause.unwrap_or_else(|err| {
                tracing::debug!(query = source, error = %err, "invalid query clause");
                Expr::Invalid
            })
        })
        .collect();
    Query { clauses }
}

/// Parse a query, rejecting it if any clause is malformed.
pub fn try_parse_query(source: &str) -> Result<Query, QueryError> {
    let clauses = parse_clauses(source)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Query { clauses })
}

fn parse_clauses(source: &str) -> Vec<Result<Expr, QueryError>> {
    let mut input = ParserInput::new(source);
    let mut parser = Parser::new(&mut input);
    let mut clauses = Vec::new();

    if parser.is_exhausted() {
        return clauses;
    }

    loop {
        let index = clauses.len();
        let result = parser
            .parse_until_before(Delimiter::Comma, parse_clause)
            .map_err(|err| QueryError {
                clause: index,
                line: err.location.line + 1,
                column: err.location.column,
                message: describe(&err),
            });
        clauses.push(result);

        match parser.next() {
            Ok(&Token::Comma) => continue,
            _ => break,
        }
    }

    clauses
}

fn describe(err: &ParseError<'_, QueryParseError>) -> String {
    match &err.kind {
        cssparser::ParseErrorKind::Custom(custom) => custom.to_string(),
        cssparser::ParseErrorKind::Basic(basic) => format!("{:?}", basic),
    }
}

fn parse_clause<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    if input
        .try_parse(|i| {
            i.expect_ident_matching("never")?;
            i.expect_exhausted()
        })
        .is_ok()
    {
        return Ok(Expr::Never);
    }

    let state = input.state();
    let is_media = matches!(
        input.next(),
        Ok(Token::AtKeyword(name)) if name.eq_ignore_ascii_case("media")
    );
    if is_media {
        let start = input.position();
        while input.next().is_ok() {}
        let text = input.slice_from(start).trim();
        if text.is_empty() {
            return Err(input.new_custom_error(QueryParseError::EmptyMedia));
        }
        return Ok(Expr::Media(text.to_string()));
    }
    input.reset(&state);

    let expr = parse_or(input)?;
    input.expect_exhausted()?;
    Ok(expr)
}

fn parse_or<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    let mut items = vec![parse_and(input)?];
    while input.try_parse(|i| i.expect_ident_matching("or")).is_ok() {
        items.push(parse_and(input)?);
    }
    Ok(flatten(items, Expr::Or))
}

fn parse_and<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    let mut items = vec![parse_unary(input)?];
    while input.try_parse(|i| i.expect_ident_matching("and")).is_ok() {
        items.push(parse_unary(input)?);
    }
    Ok(flatten(items, Expr::And))
}

fn flatten(mut items: Vec<Expr>, combine: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        combine(items)
    }
}

fn parse_unary<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    if input.try_parse(|i| i.expect_ident_matching("not")).is_ok() {
        return Ok(Expr::Not(Box::new(parse_unary(input)?)));
    }
    if input.try_parse(|i| i.expect_parenthesis_block()).is_ok() {
        return input.parse_nested_block(parse_group);
    }
    parse_term(input)
}

fn parse_group<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    let expr = parse_or(input)?;
    input.expect_exhausted()?;
    Ok(expr)
}

fn parse_term<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Expr> {
    let location = input.current_source_location();
    let field = match input.next() {
        Ok(Token::Ident(name)) => name.to_string(),
        _ => return Err(location.new_custom_error(QueryParseError::ExpectedField)),
    };
    if RESERVED.iter().any(|word| field.eq_ignore_ascii_case(word)) {
        return Err(location.new_custom_error(QueryParseError::ReservedWord(field)));
    }

    match parse_operator(input) {
        Some(op) => {
            let value = parse_value(input)?;
            Ok(Expr::Compare { field, op, value })
        }
        None => Ok(Expr::Field(field)),
    }
}

fn parse_operator<'i, 't>(input: &mut Parser<'i, 't>) -> Option<CompareOp> {
    let state = input.state();
    let token = match input.next() {
        Ok(token) => token.clone(),
        Err(_) => {
            input.reset(&state);
            return None;
        }
    };

    let followed_by_eq = |input: &mut Parser<'i, 't>| input.try_parse(|i| i.expect_delim('=')).is_ok();
    let op = match token {
        Token::Colon => CompareOp::Eq,
        Token::Delim('=') => {
            followed_by_eq(input);
            CompareOp::Eq
        }
        Token::Delim('!') if followed_by_eq(input) => CompareOp::Ne,
        Token::Delim('<') if followed_by_eq(input) => CompareOp::Le,
        Token::Delim('<') => CompareOp::Lt,
        Token::Delim('>') if followed_by_eq(input) => CompareOp::Ge,
        Token::Delim('>') => CompareOp::Gt,
        _ => {
            input.reset(&state);
            return None;
        }
    };
    Some(op)
}

fn parse_value<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, Literal> {
    let location = input.current_source_location();
    let start = input.position();
    let token = input.next()?.clone();
    // Source text keeps full f64 precision; the token's f32 is the fallback.
    let text = input.slice_from(start).trim();

    let literal = match token {
        Token::Number { value, .. } => Literal::Number(text.parse().unwrap_or(value as f64)),
        Token::Dimension { value, ref unit, .. } => {
            if !unit.eq_ignore_ascii_case("px") {
                return Err(location.new_custom_error(QueryParseError::UnsupportedUnit(unit.to_string())));
            }
            let digits = text.get(..text.len().saturating_sub(unit.len())).unwrap_or_default();
            Literal::Number(digits.parse().unwrap_or(value as f64))
        }
        Token::Percentage { unit_value, .. } => Literal::Number(
            text.trim_end_matches('%')
                .parse()
                .unwrap_or(unit_value as f64 * 100.0),
        ),
        Token::QuotedString(s) => Literal::Text(s.to_string()),
        Token::Ident(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ => Literal::Text(s.to_string()),
        },
        _ => return Err(location.new_custom_error(QueryParseError::InvalidValue)),
    };
    Ok(literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Expr {
        let mut query = parse_query(source);
        assert_eq!(query.clauses.len(), 1, "{}", source);
        query.clauses.remove(0)
    }

    fn compare(field: &str, op: CompareOp, value: Literal) -> Expr {
        Expr::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    #[test]
    fn test_parse_comparisons() {
        assert_eq!(
            single("(width: 300)"),
            compare("width", CompareOp::Eq, Literal::Number(300.0))
        );
        assert_eq!(
            single("(width < 400px)"),
            compare("width", CompareOp::Lt, Literal::Number(400.0))
        );
        assert_eq!(
            single("(volume >= 0.35)"),
            compare("volume", CompareOp::Ge, Literal::Number(0.35))
        );
        assert_eq!(
            single("(playback-rate != 1)"),
            compare("playback-rate", CompareOp::Ne, Literal::Number(1.0))
        );
        assert_eq!(
            single("(progress == 50%)"),
            compare("progress", CompareOp::Eq, Literal::Number(50.0))
        );
        assert_eq!(
            single("(height <= 200)"),
            compare("height", CompareOp::Le, Literal::Number(200.0))
        );
    }

    #[test]
    fn test_parse_text_and_bool_values() {
        assert_eq!(
            single("(orientation: \"portrait\")"),
            compare("orientation", CompareOp::Eq, Literal::Text("portrait".into()))
        );
        assert_eq!(
            single("(orientation: landscape)"),
            compare("orientation", CompareOp::Eq, Literal::Text("landscape".into()))
        );
        assert_eq!(
            single("(paused = false)"),
            compare("paused", CompareOp::Eq, Literal::Bool(false))
        );
    }

    #[test]
    fn test_parse_boolean_structure() {
        let expr = single("(width < 400) and (orientation: \"portrait\") or not (paused)");
        assert_eq!(
            expr,
            Expr::Or(vec![
                Expr::And(vec![
                    compare("width", CompareOp::Lt, Literal::Number(400.0)),
                    compare("orientation", CompareOp::Eq, Literal::Text("portrait".into())),
                ]),
                Expr::Not(Box::new(Expr::Field("paused".into()))),
            ])
        );

        let nested = single("((ended) or (paused)) and (muted)");
        assert_eq!(
            nested,
            Expr::And(vec![
                Expr::Or(vec![Expr::Field("ended".into()), Expr::Field("paused".into())]),
                Expr::Field("muted".into()),
            ])
        );
    }

    #[test]
    fn test_parse_clauses() {
        let query = parse_query("never, (paused), @media (max-width: 600px) and (hover), (ended)");
        assert_eq!(
            query.clauses,
            vec![
                Expr::Never,
                Expr::Field("paused".into()),
                Expr::Media("(max-width: 600px) and (hover)".into()),
                Expr::Field("ended".into()),
            ]
        );
    }

    #[test]
    fn test_malformed_clause_is_isolated() {
        let query = parse_query("(width <), (paused), (and), (width: 10em), @media");
        assert_eq!(
            query.clauses,
            vec![
                Expr::Invalid,
                Expr::Field("paused".into()),
                Expr::Invalid,
                Expr::Invalid,
                Expr::Invalid,
            ]
        );
    }

    #[test]
    fn test_try_parse_reports_clause() {
        let err = try_parse_query("(paused), (width: 3em)").unwrap_err();
        assert_eq!(err.clause, 1);
        assert!(err.message.contains("em"));
        assert!(try_parse_query("(paused) and (muted)").is_ok());
    }

    #[test]
    fn test_empty_query_has_no_clauses() {
        assert!(parse_query("").clauses.is_empty());
        assert!(parse_query("   ").clauses.is_empty());
    }
}
