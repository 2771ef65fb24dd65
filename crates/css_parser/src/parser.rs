//! Media query parser.

use crate::media::{MediaFeature, MediaQuery, MediaQueryList, MediaType};
use crate::values::FeatureValue;
use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};

/// Media query parse error.
#[derive(Clone, Debug, PartialEq)]
pub enum CssParseError {
    InvalidFeature,
    InvalidValue,
}

type ParseResult<'i, T> = Result<T, ParseError<'i, CssParseError>>;

/// Parse a comma-separated media query list such as
/// `screen and (min-width: 600px), print`.
///
/// A query that fails to parse becomes `not all`, so it never matches but
/// does not invalidate the rest of the list.
pub fn parse_media_query_list(css: &str) -> MediaQueryList {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut queries = Vec::new();

    if parser.is_exhausted() {
        return MediaQueryList { queries };
    }

    loop {
        let result = parser.parse_until_before(Delimiter::Comma, parse_complete_query);

        match result {
            Ok(query) => queries.push(query),
            Err(err) => {
                tracing::debug!(query = css, error = ?err.kind, "invalid media query");
                queries.push(MediaQuery::not_all());
            }
        }

        match parser.next() {
            Ok(&Token::Comma) => continue,
            _ => break,
        }
    }

    MediaQueryList { queries }
}

fn parse_complete_query<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, MediaQuery> {
    let query = parse_media_query(input)?;
    input.expect_exhausted()?;
    Ok(query)
}

/// Parse a single media query.
fn parse_media_query<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, MediaQuery> {
    let mut negated = false;

    // Check for "not" or "only"
    if input.try_parse(|i| i.expect_ident_matching("not")).is_ok() {
        negated = true;
    } else {
        input.try_parse(|i| i.expect_ident_matching("only")).ok();
    }

    let media_type = input
        .try_parse(|i| i.expect_ident().map(|s| s.to_string()))
        .ok()
        .and_then(|ident| ident.parse::<MediaType>().ok());

    let mut features = Vec::new();
    if media_type.is_none() {
        features.push(parse_feature_block(input)?);
    }
    while input.try_parse(|i| i.expect_ident_matching("and")).is_ok() {
        features.push(parse_feature_block(input)?);
    }

    Ok(MediaQuery {
        media_type,
        features,
        negated,
    })
}

fn parse_feature_block<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, MediaFeature> {
    input.expect_parenthesis_block()?;
    input.parse_nested_block(parse_media_feature)
}

/// Parse a media feature.
fn parse_media_feature<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, MediaFeature> {
    let name = input
        .expect_ident()
        .map(|s| s.to_string())
        .map_err(|_| input.new_custom_error(CssParseError::InvalidFeature))?;

    let value = if input.try_parse(|i| i.expect_colon()).is_ok() {
        Some(parse_feature_value(input)?)
    } else {
        None
    };
    input.expect_exhausted()?;

    Ok(MediaFeature::new(&name, value))
}

/// Parse a media feature value.
fn parse_feature_value<'i, 't>(input: &mut Parser<'i, 't>) -> ParseResult<'i, FeatureValue> {
    let token = input.next()?.clone();
    let value = match token {
        Token::Ident(s) | Token::QuotedString(s) => FeatureValue::Keyword(s.to_string()),
        Token::Number { value, .. } => {
            if input.try_parse(|i| i.expect_delim('/')).is_ok() {
                let denominator = input.expect_number()?;
                FeatureValue::Ratio(value, denominator)
            } else {
                FeatureValue::Number(value)
            }
        }
        Token::Percentage { unit_value, .. } => FeatureValue::Unresolved(unit_value * 100.0, "%".into()),
        Token::Dimension { value, unit, .. } => FeatureValue::dimension(value, &unit),
        _ => return Err(input.new_custom_error(CssParseError::InvalidValue)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaContext, RangePrefix};

    #[test]
    fn test_parse_type_and_features() {
        let list = parse_media_query_list("screen and (min-width: 768px) and (orientation: landscape)");
        assert_eq!(list.queries.len(), 1);
        let query = &list.queries[0];
        assert_eq!(query.media_type, Some(MediaType::Screen));
        assert_eq!(query.features.len(), 2);
        assert_eq!(query.features[0].name, "width");
        assert_eq!(query.features[0].prefix, RangePrefix::Min);
        assert_eq!(query.features[0].value, Some(FeatureValue::Length(768.0)));
    }

    #[test]
    fn test_parse_bare_feature() {
        let list = parse_media_query_list("(max-width: 600px)");
        assert_eq!(list.queries[0].media_type, None);
        assert!(list.matches(&MediaContext::screen(500.0, 800.0)));
        assert!(!list.matches(&MediaContext::screen(900.0, 800.0)));
    }

    #[test]
    fn test_parse_ratio_and_boolean_feature() {
        let list = parse_media_query_list("(min-aspect-ratio: 16/9) and (hover)");
        let features = &list.queries[0].features;
        assert_eq!(features[0].value, Some(FeatureValue::Ratio(16.0, 9.0)));
        assert_eq!(features[1].value, None);
    }

    #[test]
    fn test_comma_list_is_any() {
        let list = parse_media_query_list("print, (max-width: 400px)");
        assert_eq!(list.queries.len(), 2);
        assert!(list.matches(&MediaContext::screen(320.0, 640.0)));
        assert!(!list.matches(&MediaContext::screen(1024.0, 640.0)));
    }

    #[test]
    fn test_not_query() {
        let list = parse_media_query_list("not print");
        assert!(list.queries[0].negated);
        assert!(list.matches(&MediaContext::default()));
    }

    #[test]
    fn test_invalid_query_never_matches() {
        let list = parse_media_query_list("(min-width: ) , screen");
        assert_eq!(list.queries.len(), 2);
        assert!(!list.queries[0].matches(&MediaContext::default()));
        assert!(list.matches(&MediaContext::default()));

        let list = parse_media_query_list("screen and");
        assert!(!list.matches(&MediaContext::default()));
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert!(parse_media_query_list("").matches(&MediaContext::default()));
    }
}
