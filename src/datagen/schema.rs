//! Synthetic data schemas
//!
//! A schema lists the columns to generate, how each one is distributed, the
//! aggregators a benchmark index uses and the interval rows fall into.

use crate::aggregation::{AggregatorDef, AggregatorKind, DimFilter, StringOrdering};
use crate::storage::TimeRange;

/// How values of one column are drawn
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Dimension cycling through `start..end`
    Sequential { start: i64, end: i64 },
    /// Dimension drawn uniformly from `start..end`
    Uniform { start: i64, end: i64 },
    /// Dimension drawn from `start..end` with Zipf-distributed popularity
    Zipf { start: i64, end: i64, exponent: f64 },
    /// Dimension drawn from a fixed set with given weights
    Enumerated {
        values: Vec<String>,
        weights: Vec<f64>,
    },
    /// Dimension holding 1 to `max_values` distinct entries of `values`
    MultiValue {
        values: Vec<String>,
        max_values: usize,
    },
    /// Metric cycling through `start..end`
    LongSequential { start: i64, end: i64 },
    /// Metric drawn uniformly from `start..end`
    LongUniform { start: i64, end: i64 },
    /// Normally distributed metric
    DoubleNormal { mean: f64, stddev: f64 },
    /// Metric drawn uniformly from `[min, max)`
    DoubleUniform { min: f64, max: f64 },
}

impl ColumnKind {
    /// True for metric columns
    pub fn is_metric(&self) -> bool {
        matches!(
            self,
            ColumnKind::LongSequential { .. }
                | ColumnKind::LongUniform { .. }
                | ColumnKind::DoubleNormal { .. }
                | ColumnKind::DoubleUniform { .. }
        )
    }
}

/// One generated column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
    /// Chance that a dimension value is null
    pub null_probability: f64,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            null_probability: 0.0,
        }
    }

    pub fn with_nulls(mut self, probability: f64) -> Self {
        self.null_probability = probability.clamp(0.0, 1.0);
        self
    }
}

/// A named benchmark schema
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaInfo {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub aggregators: Vec<AggregatorDef>,
    pub data_interval: TimeRange,
}

/// Names accepted by [`SchemaInfo::by_name`]
pub const SCHEMA_NAMES: &[&str] = &["basic", "simple"];

fn data_interval() -> TimeRange {
    TimeRange::day(2000, 1, 1).unwrap_or_else(|| TimeRange::new(946_684_800_000, 946_771_200_000))
}

impl SchemaInfo {
    /// Mixed-distribution schema with a multi-value and a high cardinality dimension
    pub fn basic() -> Self {
        let columns = vec![
            ColumnSchema::new("dimSequential", ColumnKind::Sequential { start: 0, end: 1000 }),
            ColumnSchema::new(
                "dimZipf",
                ColumnKind::Zipf {
                    start: 1,
                    end: 101,
                    exponent: 1.0,
                },
            ),
            ColumnSchema::new("dimUniform", ColumnKind::Uniform { start: 1, end: 100_000 }),
            ColumnSchema::new(
                "dimSequentialHalfNull",
                ColumnKind::Sequential { start: 0, end: 1000 },
            )
            .with_nulls(0.5),
            ColumnSchema::new(
                "dimMultivalEnumerated",
                ColumnKind::MultiValue {
                    values: ["Hello", "World", "Foo", "Bar", "Baz"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    max_values: 3,
                },
            ),
            ColumnSchema::new(
                "dimEnumerated",
                ColumnKind::Enumerated {
                    values: ["Hello", "World", "Foo", "Bar"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    weights: vec![0.5, 0.25, 0.15, 0.10],
                },
            ),
            ColumnSchema::new("dimHyperUnique", ColumnKind::Uniform { start: 0, end: 100_000 }),
            ColumnSchema::new(
                "metLongSequential",
                ColumnKind::LongSequential { start: 0, end: 10_000 },
            ),
            ColumnSchema::new("metLongUniform", ColumnKind::LongUniform { start: 0, end: 500 }),
            ColumnSchema::new(
                "metFloatNormal",
                ColumnKind::DoubleNormal {
                    mean: 5000.0,
                    stddev: 1.0,
                },
            ),
            ColumnSchema::new(
                "metFloatUniform",
                ColumnKind::DoubleUniform {
                    min: 0.0,
                    max: 1000.0,
                },
            ),
        ];

        let aggregators = vec![
            AggregatorDef::count("rows"),
            AggregatorDef::long_sum("sumLongSequential", "metLongSequential"),
            AggregatorDef::double_max("maxLongUniform", "metLongUniform"),
            AggregatorDef::double_sum("sumFloatNormal", "metFloatNormal"),
            AggregatorDef::double_min("minFloatUniform", "metFloatUniform"),
            AggregatorDef::hyper_unique("hyperUniquesHyperUnique", "dimHyperUnique"),
        ];

        Self {
            name: "basic".into(),
            columns,
            aggregators,
            data_interval: data_interval(),
        }
    }

    /// One dimension, one metric
    pub fn simple() -> Self {
        Self {
            name: "simple".into(),
            columns: vec![
                ColumnSchema::new("dimSequential", ColumnKind::Sequential { start: 0, end: 1000 }),
                ColumnSchema::new(
                    "metLongSequential",
                    ColumnKind::LongSequential { start: 0, end: 10_000 },
                ),
            ],
            aggregators: vec![
                AggregatorDef::count("rows"),
                AggregatorDef::long_sum("sumLongSequential", "metLongSequential"),
            ],
            data_interval: data_interval(),
        }
    }

    /// Look a schema up by name
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "basic" => Some(Self::basic()),
            "simple" => Some(Self::simple()),
            _ => None,
        }
    }

    /// Dimension column names in declaration order
    pub fn dimensions(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.kind.is_metric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Metric column names in declaration order
    pub fn metrics(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind.is_metric())
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Filter that every `dimSequential` value fails, so a query with it still
/// evaluates the predicate on every fact without matching any
pub fn benchmark_filter() -> DimFilter {
    DimFilter::or(vec![
        DimFilter::bound("dimSequential", "-1", "-1", true, StringOrdering::Alphanumeric),
        DimFilter::regex("dimSequential", "X"),
        DimFilter::contains("dimSequential", "X"),
        DimFilter::in_values("dimSequential", ["X"]),
    ])
}

/// Filtered count aggregator over [`benchmark_filter`]
pub fn filtered_count(name: &str) -> AggregatorDef {
    AggregatorDef::filtered(name, benchmark_filter(), AggregatorKind::Count)
}
