//! Filter expression parser
//!
//! Parses a small textual filter language into a [`DimFilter`].
//!
//! # Supported Syntax
//!
//! ```text
//! expr       := or
//! or         := and (OR and)*
//! and        := unary (AND unary)*
//! unary      := NOT unary | '(' expr ')' | comparison
//! comparison := dim = 'v' | dim != 'v'
//!             | dim (< | <= | > | >=) ('v' | number)
//!             | dim ~ 'regex'
//!             | dim CONTAINS 'v'
//!             | dim IN ('a', 'b', ...)
//!             | dim IS [NOT] NULL
//! ```
//!
//! Quoted bounds compare lexicographically, numeric bounds numerically.
//!
//! # Examples
//!
//! ```text
//! dimSequential = '7'
//! dimZipf IN ('a', 'b') AND NOT dimSequential IS NULL
//! dimSequential >= 10 AND dimSequential < 20
//! (dimUniform ~ '^1' OR dimZipf CONTAINS 'x')
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, opt, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::aggregation::{DimFilter, StringOrdering};
use crate::query::error::{QueryError, QueryResult};

/// Parse a filter expression
pub fn parse_filter(input: &str) -> QueryResult<DimFilter> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QueryError::Parse("Empty filter expression".into()));
    }

    match parse_or(input) {
        Ok((remaining, filter)) => {
            if remaining.trim().is_empty() {
                Ok(filter)
            } else {
                Err(QueryError::Parse(format!(
                    "Unexpected input after filter: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(QueryError::Parse(format!("Parse error: {:?}", e))),
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Right-hand side of a comparison
enum Literal {
    Str(String),
    Number(String),
}

fn parse_or(input: &str) -> IResult<&str, DimFilter> {
    map(
        separated_list1(
            delimited(multispace0, tag_no_case("OR"), multispace1),
            parse_and,
        ),
        |mut fields| {
            if fields.len() == 1 {
                fields.remove(0)
            } else {
                DimFilter::or(fields)
            }
        },
    )(input)
}

fn parse_and(input: &str) -> IResult<&str, DimFilter> {
    map(
        separated_list1(
            delimited(multispace0, tag_no_case("AND"), multispace1),
            parse_unary,
        ),
        |mut fields| {
            if fields.len() == 1 {
                fields.remove(0)
            } else {
                DimFilter::and(fields)
            }
        },
    )(input)
}

fn parse_unary(input: &str) -> IResult<&str, DimFilter> {
    let (input, _) = multispace0(input)?;
    alt((
        map(
            preceded(pair(tag_no_case("NOT"), multispace1), parse_unary),
            DimFilter::not,
        ),
        delimited(
            pair(char('('), multispace0),
            parse_or,
            pair(multispace0, char(')')),
        ),
        parse_comparison,
    ))(input)
}

/// Parse a single `dim <op> value` comparison
fn parse_comparison(input: &str) -> IResult<&str, DimFilter> {
    let (input, dimension) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    alt((
        move |i| parse_null_check(i, dimension),
        move |i| parse_in(i, dimension),
        move |i| parse_contains(i, dimension),
        move |i| parse_regex(i, dimension),
        move |i| parse_operator_comparison(i, dimension),
    ))(input)
}

/// `IS NULL` / `IS NOT NULL`
fn parse_null_check<'a>(input: &'a str, dimension: &str) -> IResult<&'a str, DimFilter> {
    let (input, _) = tag_no_case("IS")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, negated) = opt(pair(tag_no_case("NOT"), multispace1))(input)?;
    let (input, _) = tag_no_case("NULL")(input)?;

    let filter = DimFilter::is_null(dimension);
    Ok((
        input,
        if negated.is_some() {
            DimFilter::not(filter)
        } else {
            filter
        },
    ))
}

/// `IN ('a', 'b')`
fn parse_in<'a>(input: &'a str, dimension: &str) -> IResult<&'a str, DimFilter> {
    let (input, _) = tag_no_case("IN")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, values) = delimited(
        pair(char('('), multispace0),
        separated_list1(
            delimited(multispace0, char(','), multispace0),
            parse_quoted_string,
        ),
        pair(multispace0, char(')')),
    )(input)?;
    Ok((input, DimFilter::in_values(dimension, values)))
}

/// `CONTAINS 'x'` (case-insensitive)
fn parse_contains<'a>(input: &'a str, dimension: &str) -> IResult<&'a str, DimFilter> {
    let (input, _) = tag_no_case("CONTAINS")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, needle) = parse_quoted_string(input)?;
    Ok((input, DimFilter::contains(dimension, needle)))
}

/// `~ 'regex'`
fn parse_regex<'a>(input: &'a str, dimension: &str) -> IResult<&'a str, DimFilter> {
    let (input, _) = char('~')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, pattern) = parse_quoted_string(input)?;
    Ok((input, DimFilter::regex(dimension, pattern)))
}

fn parse_operator_comparison<'a>(input: &'a str, dimension: &str) -> IResult<&'a str, DimFilter> {
    let (input, op) = parse_operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, literal) = alt((
        map(parse_quoted_string, Literal::Str),
        map(parse_number, |n: &str| Literal::Number(n.to_string())),
    ))(input)?;

    let (text, ordering) = match literal {
        Literal::Str(s) => (s, StringOrdering::Lexicographic),
        Literal::Number(n) => (n, StringOrdering::Numeric),
    };

    let bound = |lower: Option<String>, upper: Option<String>, strict: bool| DimFilter::Bound {
        dimension: dimension.to_string(),
        lower_strict: strict && lower.is_some(),
        upper_strict: strict && upper.is_some(),
        lower,
        upper,
        ordering,
    };

    let filter = match op {
        Operator::Eq => DimFilter::selector(dimension, text),
        Operator::Ne => DimFilter::not(DimFilter::selector(dimension, text)),
        Operator::Gt => bound(Some(text), None, true),
        Operator::Gte => bound(Some(text), None, false),
        Operator::Lt => bound(None, Some(text), true),
        Operator::Lte => bound(None, Some(text), false),
    };
    Ok((input, filter))
}

/// Parse comparison operator
fn parse_operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::Gte, tag(">=")),
        value(Operator::Lte, tag("<=")),
        value(Operator::Ne, alt((tag("!="), tag("<>")))),
        value(Operator::Gt, tag(">")),
        value(Operator::Lt, tag("<")),
        value(Operator::Eq, alt((tag("=="), tag("=")))),
    ))(input)
}

/// Parse identifier (dimension name)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

/// Parse quoted string
fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('\'')(input)?;
    let (input, content) = take_while(|c| c != '\'')(input)?;
    let (input, _) = char('\'')(input)?;
    Ok((input, content.to_string()))
}

/// Parse a number, keeping its text
fn parse_number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)
}
