//! Timeseries query definition
//!
//! A query buckets facts by granularity inside an interval and folds a set
//! of aggregators per bucket, optionally behind a top-level filter.
//!
//! ```rust
//! use segmill::aggregation::{AggregatorDef, AggregatorKind, DimFilter};
//! use segmill::query::TimeseriesQuery;
//! use segmill::storage::{Granularity, TimeRange};
//!
//! let query = TimeseriesQuery::builder(TimeRange::eternity())
//!     .granularity(Granularity::All)
//!     .aggregator(AggregatorDef::filtered(
//!         "hits",
//!         DimFilter::selector("dimSequential", "7"),
//!         AggregatorKind::Count,
//!     ))
//!     .build()
//!     .unwrap();
//! assert_eq!(query.columns(), vec!["hits".to_string()]);
//! ```

use crate::aggregation::{AggregatorDef, DimFilter};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{Granularity, TimeRange};
use serde::{Deserialize, Serialize};

/// Default number of rows handed to a vectorized scan at once
pub const DEFAULT_VECTOR_SIZE: usize = 512;

/// Whether the query may use a source's vectorized path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorizeMode {
    /// Always scalar
    #[default]
    False,
    /// Vectorized when the source supports it, scalar otherwise
    True,
    /// Vectorized or fail
    Force,
}

impl VectorizeMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "false" | "off" => Some(Self::False),
            "true" | "on" => Some(Self::True),
            "force" => Some(Self::Force),
            _ => None,
        }
    }
}

impl std::fmt::Display for VectorizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::False => write!(f, "false"),
            Self::True => write!(f, "true"),
            Self::Force => write!(f, "force"),
        }
    }
}

/// Execution hints carried with a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    #[serde(default)]
    pub vectorize: VectorizeMode,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
}

fn default_vector_size() -> usize {
    DEFAULT_VECTOR_SIZE
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            vectorize: VectorizeMode::default(),
            vector_size: DEFAULT_VECTOR_SIZE,
        }
    }
}

/// A query ready for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesQuery {
    /// Only facts with a timestamp inside this range are read
    pub interval: TimeRange,
    /// Result bucket size
    #[serde(default)]
    pub granularity: Granularity,
    /// One result column per aggregator
    pub aggregators: Vec<AggregatorDef>,
    /// Applied before any aggregator
    #[serde(default)]
    pub filter: Option<DimFilter>,
    /// Newest bucket first
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub context: QueryContext,
}

impl TimeseriesQuery {
    /// Start building a query over `interval`
    pub fn builder(interval: TimeRange) -> TimeseriesQueryBuilder {
        TimeseriesQueryBuilder::new(interval)
    }

    /// Result column names in aggregator order
    pub fn columns(&self) -> Vec<String> {
        self.aggregators.iter().map(|a| a.name.clone()).collect()
    }
}

/// Builder for [`TimeseriesQuery`]
#[derive(Debug, Clone)]
pub struct TimeseriesQueryBuilder {
    interval: TimeRange,
    granularity: Granularity,
    aggregators: Vec<AggregatorDef>,
    filter: Option<DimFilter>,
    descending: bool,
    context: QueryContext,
}

impl TimeseriesQueryBuilder {
    pub fn new(interval: TimeRange) -> Self {
        Self {
            interval,
            granularity: Granularity::All,
            aggregators: Vec::new(),
            filter: None,
            descending: false,
            context: QueryContext::default(),
        }
    }

    /// Bucket size (defaults to `all`)
    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn aggregator(mut self, aggregator: AggregatorDef) -> Self {
        self.aggregators.push(aggregator);
        self
    }

    pub fn aggregators(mut self, aggregators: impl IntoIterator<Item = AggregatorDef>) -> Self {
        self.aggregators.extend(aggregators);
        self
    }

    pub fn filter(mut self, filter: DimFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn vectorize(mut self, mode: VectorizeMode) -> Self {
        self.context.vectorize = mode;
        self
    }

    pub fn vector_size(mut self, size: usize) -> Self {
        self.context.vector_size = size;
        self
    }

    /// Validate and build the query
    pub fn build(self) -> QueryResult<TimeseriesQuery> {
        if self.aggregators.is_empty() {
            return Err(QueryError::InvalidQuery(
                "At least one aggregator is required".into(),
            ));
        }
        if self.context.vector_size == 0 {
            return Err(QueryError::InvalidQuery(
                "vector_size must be at least 1".into(),
            ));
        }

        let mut names: Vec<&str> = self.aggregators.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(QueryError::InvalidQuery(format!(
                "Duplicate output column '{}'",
                pair[0]
            )));
        }

        Ok(TimeseriesQuery {
            interval: self.interval,
            granularity: self.granularity,
            aggregators: self.aggregators,
            filter: self.filter,
            descending: self.descending,
            context: self.context,
        })
    }
}
