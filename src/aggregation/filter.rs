//! Dimension filters
//!
//! `DimFilter` is the serializable description (stored inside segment
//! metadata for filtered aggregators); `CompiledFilter` is the evaluated form
//! with regexes compiled and `IN` sets hashed.
//!
//! A missing dimension and an empty multi-value both read as null. A
//! multi-value dimension matches a leaf predicate when any of its values does.

use crate::aggregation::{AggregationError, RowView};
use crate::storage::compression::ColumnBatch;
use crate::storage::DimValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Ordering used by bound filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StringOrdering {
    #[default]
    Lexicographic,
    /// Natural ordering: digit runs compare by numeric value
    Alphanumeric,
    /// Both sides parsed as numbers; unparseable values never match
    Numeric,
}

impl StringOrdering {
    /// Compare two values, `None` when they are not comparable
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        match self {
            Self::Lexicographic => Some(a.cmp(b)),
            Self::Alphanumeric => Some(alphanumeric_cmp(a, b)),
            Self::Numeric => {
                let a: f64 = a.trim().parse().ok()?;
                let b: f64 = b.trim().parse().ok()?;
                a.partial_cmp(&b)
            }
        }
    }
}

fn alphanumeric_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_a = a.iter().take_while(|c| c.is_ascii_digit()).count();
                let run_b = b.iter().take_while(|c| c.is_ascii_digit()).count();
                let (digits_a, rest_a) = a.split_at(run_a);
                let (digits_b, rest_b) = b.split_at(run_b);
                let trim = |d: &[u8]| -> usize { d.iter().take_while(|c| **c == b'0').count() };
                let (sig_a, sig_b) = (&digits_a[trim(digits_a)..], &digits_b[trim(digits_b)..]);

                let ord = sig_a
                    .len()
                    .cmp(&sig_b.len())
                    .then_with(|| sig_a.cmp(sig_b))
                    .then_with(|| digits_a.len().cmp(&digits_b.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

/// Predicate over dimension values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DimFilter {
    /// Equality; `value: None` matches null
    Selector {
        dimension: String,
        value: Option<String>,
    },
    /// Range with optional open ends
    Bound {
        dimension: String,
        #[serde(default)]
        lower: Option<String>,
        #[serde(default)]
        upper: Option<String>,
        #[serde(default)]
        lower_strict: bool,
        #[serde(default)]
        upper_strict: bool,
        #[serde(default)]
        ordering: StringOrdering,
    },
    /// Unanchored regex search
    Regex { dimension: String, pattern: String },
    /// Substring search
    Search {
        dimension: String,
        value: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// Set membership
    In {
        dimension: String,
        values: Vec<String>,
    },
    And { fields: Vec<DimFilter> },
    Or { fields: Vec<DimFilter> },
    Not { field: Box<DimFilter> },
}

impl DimFilter {
    pub fn selector(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Selector {
            dimension: dimension.into(),
            value: Some(value.into()),
        }
    }

    pub fn is_null(dimension: impl Into<String>) -> Self {
        Self::Selector {
            dimension: dimension.into(),
            value: None,
        }
    }

    /// Bound filter with both ends set
    pub fn bound(
        dimension: impl Into<String>,
        lower: impl Into<String>,
        upper: impl Into<String>,
        strict: bool,
        ordering: StringOrdering,
    ) -> Self {
        Self::Bound {
            dimension: dimension.into(),
            lower: Some(lower.into()),
            upper: Some(upper.into()),
            lower_strict: strict,
            upper_strict: strict,
            ordering,
        }
    }

    pub fn regex(dimension: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            dimension: dimension.into(),
            pattern: pattern.into(),
        }
    }

    /// Case-insensitive substring search
    pub fn contains(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Search {
            dimension: dimension.into(),
            value: value.into(),
            case_sensitive: false,
        }
    }

    pub fn in_values<I, S>(dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            dimension: dimension.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(fields: Vec<DimFilter>) -> Self {
        Self::And { fields }
    }

    pub fn or(fields: Vec<DimFilter>) -> Self {
        Self::Or { fields }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(field: DimFilter) -> Self {
        Self::Not {
            field: Box::new(field),
        }
    }

    /// Compile into an evaluable filter
    pub fn compile(&self) -> Result<CompiledFilter, AggregationError> {
        Ok(CompiledFilter {
            node: Node::compile(self)?,
        })
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Equals(Option<String>),
    Bound {
        lower: Option<String>,
        upper: Option<String>,
        lower_strict: bool,
        upper_strict: bool,
        ordering: StringOrdering,
    },
    Regex(regex::Regex),
    Contains {
        needle: String,
        case_sensitive: bool,
    },
    In(HashSet<String>),
}

impl Predicate {
    fn matches_value(&self, value: Option<&str>) -> bool {
        let value = match (self, value) {
            (Predicate::Equals(expected), value) => return expected.as_deref() == value,
            (_, None) => return false,
            (_, Some(v)) => v,
        };

        match self {
            Predicate::Equals(_) => false,
            Predicate::Bound {
                lower,
                upper,
                lower_strict,
                upper_strict,
                ordering,
            } => {
                let lower_ok = match lower {
                    None => true,
                    Some(lower) => match ordering.compare(value, lower) {
                        Some(Ordering::Greater) => true,
                        Some(Ordering::Equal) => !lower_strict,
                        _ => false,
                    },
                };
                let upper_ok = match upper {
                    None => true,
                    Some(upper) => match ordering.compare(value, upper) {
                        Some(Ordering::Less) => true,
                        Some(Ordering::Equal) => !upper_strict,
                        _ => false,
                    },
                };
                lower_ok && upper_ok
            }
            Predicate::Regex(re) => re.is_match(value),
            Predicate::Contains {
                needle,
                case_sensitive,
            } => {
                if *case_sensitive {
                    value.contains(needle.as_str())
                } else {
                    value.to_lowercase().contains(needle.as_str())
                }
            }
            Predicate::In(values) => values.contains(value),
        }
    }

    fn matches_dim(&self, value: Option<&DimValue>) -> bool {
        let values = value.map(DimValue::values).unwrap_or(&[]);
        if values.is_empty() {
            self.matches_value(None)
        } else {
            values.iter().any(|v| self.matches_value(Some(v)))
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        dimension: String,
        predicate: Predicate,
    },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

impl Node {
    fn compile(filter: &DimFilter) -> Result<Self, AggregationError> {
        let leaf = |dimension: &String, predicate| Node::Leaf {
            dimension: dimension.clone(),
            predicate,
        };

        Ok(match filter {
            DimFilter::Selector { dimension, value } => {
                leaf(dimension, Predicate::Equals(value.clone()))
            }
            DimFilter::Bound {
                dimension,
                lower,
                upper,
                lower_strict,
                upper_strict,
                ordering,
            } => leaf(
                dimension,
                Predicate::Bound {
                    lower: lower.clone(),
                    upper: upper.clone(),
                    lower_strict: *lower_strict,
                    upper_strict: *upper_strict,
                    ordering: *ordering,
                },
            ),
            DimFilter::Regex { dimension, pattern } => {
                let re = regex::Regex::new(pattern).map_err(|e| AggregationError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                leaf(dimension, Predicate::Regex(re))
            }
            DimFilter::Search {
                dimension,
                value,
                case_sensitive,
            } => leaf(
                dimension,
                Predicate::Contains {
                    needle: if *case_sensitive {
                        value.clone()
                    } else {
                        value.to_lowercase()
                    },
                    case_sensitive: *case_sensitive,
                },
            ),
            DimFilter::In { dimension, values } => {
                leaf(dimension, Predicate::In(values.iter().cloned().collect()))
            }
            DimFilter::And { fields } => {
                Node::And(fields.iter().map(Node::compile).collect::<Result<_, _>>()?)
            }
            DimFilter::Or { fields } => {
                Node::Or(fields.iter().map(Node::compile).collect::<Result<_, _>>()?)
            }
            DimFilter::Not { field } => Node::Not(Box::new(Node::compile(field)?)),
        })
    }

    fn matches(&self, row: &dyn RowView) -> bool {
        match self {
            Node::Leaf {
                dimension,
                predicate,
            } => predicate.matches_dim(row.dimension(dimension)),
            Node::And(children) => children.iter().all(|c| c.matches(row)),
            Node::Or(children) => children.iter().any(|c| c.matches(row)),
            Node::Not(child) => !child.matches(row),
        }
    }

    fn matches_batch(&self, batch: &ColumnBatch, dimensions: &[String]) -> Vec<bool> {
        match self {
            Node::Leaf {
                dimension,
                predicate,
            } => {
                let column = dimensions
                    .iter()
                    .position(|d| d == dimension)
                    .and_then(|idx| batch.dimensions.get(idx));
                match column {
                    Some(column) => {
                        // One evaluation per distinct value in the block
                        let per_value: Vec<bool> = column
                            .dictionary
                            .iter()
                            .map(|v| predicate.matches_dim(Some(v)))
                            .collect();
                        column
                            .ids
                            .iter()
                            .map(|id| per_value.get(*id as usize).copied().unwrap_or(false))
                            .collect()
                    }
                    None => vec![predicate.matches_dim(None); batch.len()],
                }
            }
            Node::And(children) => {
                let mut acc = vec![true; batch.len()];
                for child in children {
                    for (a, m) in acc.iter_mut().zip(child.matches_batch(batch, dimensions)) {
                        *a &= m;
                    }
                }
                acc
            }
            Node::Or(children) => {
                let mut acc = vec![false; batch.len()];
                for child in children {
                    for (a, m) in acc.iter_mut().zip(child.matches_batch(batch, dimensions)) {
                        *a |= m;
                    }
                }
                acc
            }
            Node::Not(child) => child
                .matches_batch(batch, dimensions)
                .into_iter()
                .map(|m| !m)
                .collect(),
        }
    }
}

/// A filter ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    node: Node,
}

impl CompiledFilter {
    /// Evaluate against a single row or fact
    pub fn matches(&self, row: &dyn RowView) -> bool {
        self.node.matches(row)
    }

    /// Evaluate against every row of a decoded block
    ///
    /// `dimensions` names the batch's dimension columns in order.
    pub fn matches_batch(&self, batch: &ColumnBatch, dimensions: &[String]) -> Vec<bool> {
        self.node.matches_batch(batch, dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Row;

    fn row(value: &str) -> Row {
        Row::new(0).dim("dimSequential", value)
    }

    fn check(filter: DimFilter, row: &Row) -> bool {
        filter.compile().unwrap().matches(row)
    }

    #[test]
    fn test_selector_and_null() {
        assert!(check(DimFilter::selector("dimSequential", "7"), &row("7")));
        assert!(!check(DimFilter::selector("dimSequential", "7"), &row("8")));
        assert!(check(DimFilter::is_null("other"), &row("7")));
        assert!(!check(DimFilter::is_null("dimSequential"), &row("7")));
    }

    #[test]
    fn test_strict_bound_on_same_value_matches_nothing() {
        let filter = DimFilter::bound("dimSequential", "-1", "-1", true, StringOrdering::Alphanumeric);
        for v in ["-1", "0", "1", "-2", "X"] {
            assert!(!check(filter.clone(), &row(v)), "{} should not match", v);
        }
    }

    #[test]
    fn test_bound_orderings() {
        let lex = DimFilter::bound("dimSequential", "10", "20", false, StringOrdering::Lexicographic);
        assert!(check(lex.clone(), &row("100")));
        assert!(!check(lex, &row("9")));

        let alpha = DimFilter::bound("dimSequential", "a10", "a20", false, StringOrdering::Alphanumeric);
        assert!(!check(alpha.clone(), &row("a9x")));
        assert!(check(alpha.clone(), &row("a15")));
        assert!(!check(alpha, &row("a100")));

        let numeric = DimFilter::bound("dimSequential", "10", "20", true, StringOrdering::Numeric);
        assert!(check(numeric.clone(), &row("15.5")));
        assert!(!check(numeric.clone(), &row("20")));
        assert!(!check(numeric, &row("abc")));
    }

    #[test]
    fn test_alphanumeric_cmp() {
        assert_eq!(alphanumeric_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(alphanumeric_cmp("file010", "file10"), Ordering::Greater);
        assert_eq!(alphanumeric_cmp("b", "a100"), Ordering::Greater);
        assert_eq!(alphanumeric_cmp("42", "42"), Ordering::Equal);
    }

    #[test]
    fn test_regex_search_and_in() {
        assert!(check(DimFilter::regex("dimSequential", "^1.3$"), &row("123")));
        assert!(!check(DimFilter::regex("dimSequential", "X"), &row("123")));

        assert!(check(DimFilter::contains("dimSequential", "x"), &row("aXb")));
        let sensitive = DimFilter::Search {
            dimension: "dimSequential".into(),
            value: "x".into(),
            case_sensitive: true,
        };
        assert!(!check(sensitive, &row("aXb")));

        assert!(check(DimFilter::in_values("dimSequential", ["a", "b"]), &row("b")));
        assert!(!check(DimFilter::in_values("dimSequential", ["a", "b"]), &row("c")));
    }

    #[test]
    fn test_boolean_combinators() {
        let filter = DimFilter::or(vec![
            DimFilter::selector("dimSequential", "1"),
            DimFilter::and(vec![
                DimFilter::contains("dimSequential", "2"),
                DimFilter::not(DimFilter::selector("dimSequential", "22")),
            ]),
        ]);
        assert!(check(filter.clone(), &row("1")));
        assert!(check(filter.clone(), &row("12")));
        assert!(!check(filter.clone(), &row("22")));
        assert!(!check(filter, &row("3")));
    }

    #[test]
    fn test_multi_value_matches_any() {
        let row = Row::new(0).dim("tags", vec!["Hello".to_string(), "World".to_string()]);
        assert!(check(DimFilter::selector("tags", "World"), &row));
        assert!(!check(DimFilter::is_null("tags"), &row));
    }

    #[test]
    fn test_invalid_regex() {
        let err = DimFilter::regex("d", "(").compile().unwrap_err();
        assert!(matches!(err, AggregationError::InvalidRegex { .. }));
    }

    #[test]
    fn test_json_shape() {
        let filter = DimFilter::in_values("dimSequential", ["X"]);
        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"type\":\"in\""));
        let back: DimFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
