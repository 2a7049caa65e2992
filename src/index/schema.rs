//! Index schema and fact views
//!
//! The schema is shared by a mutable index, the segments persisted from it
//! and the merge that consolidates them. Dimensions not declared in the
//! schema are ignored at ingestion.

use crate::aggregation::{AggState, AggregatorDef, MetricRef, RowView};
use crate::storage::{DimValue, Granularity, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Dimensions, aggregators and rollup settings of an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Dimension names, in tuple order
    pub dimensions: Vec<String>,
    /// Aggregators, in state order
    pub aggregators: Vec<AggregatorDef>,
    /// Truncation applied to row timestamps
    #[serde(default)]
    pub granularity: Granularity,
    /// Combine rows sharing (timestamp, dimensions) into one fact
    #[serde(default = "default_rollup")]
    pub rollup: bool,
}

fn default_rollup() -> bool {
    true
}

impl IndexSchema {
    /// Rollup schema with no timestamp truncation
    pub fn new(dimensions: Vec<String>, aggregators: Vec<AggregatorDef>) -> Self {
        Self {
            dimensions,
            aggregators,
            granularity: Granularity::None,
            rollup: true,
        }
    }

    /// Builder: set rollup
    pub fn with_rollup(mut self, rollup: bool) -> Self {
        self.rollup = rollup;
        self
    }

    /// Builder: set granularity
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Reject duplicate dimension or aggregator names and the `all`
    /// granularity, which has no bucket timestamp at ingest
    pub fn validate(&self) -> StorageResult<()> {
        if self.granularity == Granularity::All {
            return Err(StorageError::Config(
                "Granularity 'all' is a query granularity, not an ingest granularity".into(),
            ));
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if !seen.insert(dim.as_str()) {
                return Err(StorageError::Config(format!("Duplicate dimension '{}'", dim)));
            }
        }

        let mut seen = HashSet::new();
        for agg in &self.aggregators {
            if !seen.insert(agg.name.as_str()) {
                return Err(StorageError::Config(format!(
                    "Duplicate aggregator '{}'",
                    agg.name
                )));
            }
        }
        Ok(())
    }

    /// Check that `other` can be merged under this schema
    ///
    /// Dimensions, aggregators and granularity must match exactly. The
    /// rollup flag may differ: the merge decides whether to combine.
    pub fn check_compatible(&self, other: &IndexSchema, source: &str) -> StorageResult<()> {
        if self.aggregators != other.aggregators {
            let names = |aggs: &[AggregatorDef]| {
                aggs.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
            };
            return Err(StorageError::ConfigurationMismatch(format!(
                "{} was built with aggregators [{}], expected [{}]",
                source,
                names(&other.aggregators),
                names(&self.aggregators)
            )));
        }
        if self.dimensions != other.dimensions {
            return Err(StorageError::ConfigurationMismatch(format!(
                "{} has dimensions {:?}, expected {:?}",
                source, other.dimensions, self.dimensions
            )));
        }
        if self.granularity != other.granularity {
            return Err(StorageError::ConfigurationMismatch(format!(
                "{} has granularity {}, expected {}",
                source, other.granularity, self.granularity
            )));
        }
        Ok(())
    }
}

/// Backend variant of the mutable index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Hash map, sorted when persisted
    #[default]
    OnHeap,
    /// Ordered tree, always sorted
    Sorted,
}

impl IndexType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "onheap" => Some(Self::OnHeap),
            "sorted" => Some(Self::Sorted),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnHeap => write!(f, "onheap"),
            Self::Sorted => write!(f, "sorted"),
        }
    }
}

/// Name to position lookup for the columns of a schema
#[derive(Debug, Clone)]
pub struct ColumnLookup {
    dimensions: HashMap<String, usize>,
    metrics: HashMap<String, usize>,
}

impl ColumnLookup {
    pub fn new(schema: &IndexSchema) -> Self {
        Self {
            dimensions: schema
                .dimensions
                .iter()
                .enumerate()
                .map(|(i, d)| (d.clone(), i))
                .collect(),
            metrics: schema
                .aggregators
                .iter()
                .enumerate()
                .map(|(i, a)| (a.name.clone(), i))
                .collect(),
        }
    }

    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    pub fn metric(&self, name: &str) -> Option<usize> {
        self.metrics.get(name).copied()
    }
}

/// A stored fact seen through its schema
///
/// Metric lookups return the stored intermediate state, so a query-time
/// aggregator folds facts rather than the original rows.
pub struct FactView<'a> {
    pub lookup: &'a ColumnLookup,
    pub timestamp: i64,
    pub dims: &'a [DimValue],
    pub metrics: &'a [AggState],
}

impl RowView for FactView<'_> {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn dimension(&self, name: &str) -> Option<&DimValue> {
        self.lookup.dimension(name).and_then(|i| self.dims.get(i))
    }

    fn metric(&self, name: &str) -> Option<MetricRef<'_>> {
        self.lookup
            .metric(name)
            .and_then(|i| self.metrics.get(i))
            .map(MetricRef::State)
    }
}
