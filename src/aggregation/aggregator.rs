//! Aggregator definitions and intermediate states
//!
//! An `AggregatorDef` is the named, serializable description. It compiles to
//! an `Aggregator`, which folds rows into an `AggState`. States combine
//! associatively and commutatively, which is what lets rollup happen at
//! append time, again at merge time, and once more at query time.

use crate::aggregation::filter::{CompiledFilter, DimFilter};
use crate::aggregation::sketch::HyperLogLog;
use crate::aggregation::{AggregationError, RowView};
use serde::{Deserialize, Serialize};

/// What an aggregator computes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AggregatorKind {
    /// Number of rows folded
    Count,
    /// Integer sum of a metric column
    LongSum { field: String },
    /// Floating point sum of a metric column
    DoubleSum { field: String },
    DoubleMin { field: String },
    DoubleMax { field: String },
    /// Approximate distinct count of a dimension (or of a stored sketch column)
    HyperUnique { field: String },
    /// Wrapped aggregator that only sees rows matching `filter`
    Filtered {
        filter: DimFilter,
        aggregator: Box<AggregatorKind>,
    },
}

impl AggregatorKind {
    fn label(&self) -> &'static str {
        match self {
            AggregatorKind::Count => "count",
            AggregatorKind::LongSum { .. } => "longSum",
            AggregatorKind::DoubleSum { .. } => "doubleSum",
            AggregatorKind::DoubleMin { .. } => "doubleMin",
            AggregatorKind::DoubleMax { .. } => "doubleMax",
            AggregatorKind::HyperUnique { .. } => "hyperUnique",
            AggregatorKind::Filtered { .. } => "filtered",
        }
    }
}

/// A named aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorDef {
    /// Output column name
    pub name: String,
    pub kind: AggregatorKind,
}

impl AggregatorDef {
    pub fn new(name: impl Into<String>, kind: AggregatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn count(name: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::Count)
    }

    pub fn long_sum(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::LongSum { field: field.into() })
    }

    pub fn double_sum(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::DoubleSum { field: field.into() })
    }

    pub fn double_min(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::DoubleMin { field: field.into() })
    }

    pub fn double_max(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::DoubleMax { field: field.into() })
    }

    pub fn hyper_unique(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregatorKind::HyperUnique { field: field.into() })
    }

    /// Wrap `inner` so it only folds rows matching `filter`
    pub fn filtered(name: impl Into<String>, filter: DimFilter, inner: AggregatorKind) -> Self {
        Self::new(
            name,
            AggregatorKind::Filtered {
                filter,
                aggregator: Box::new(inner),
            },
        )
    }

    pub fn compile(&self) -> Result<Aggregator, AggregationError> {
        Ok(Aggregator {
            name: self.name.clone(),
            op: Op::compile(&self.kind)?,
        })
    }
}

#[derive(Debug, Clone)]
enum Op {
    Count,
    LongSum(String),
    DoubleSum(String),
    Min(String),
    Max(String),
    Unique(String),
    Filtered(CompiledFilter, Box<Op>),
}

impl Op {
    fn compile(kind: &AggregatorKind) -> Result<Self, AggregationError> {
        Ok(match kind {
            AggregatorKind::Count => Op::Count,
            AggregatorKind::LongSum { field } => Op::LongSum(field.clone()),
            AggregatorKind::DoubleSum { field } => Op::DoubleSum(field.clone()),
            AggregatorKind::DoubleMin { field } => Op::Min(field.clone()),
            AggregatorKind::DoubleMax { field } => Op::Max(field.clone()),
            AggregatorKind::HyperUnique { field } => Op::Unique(field.clone()),
            AggregatorKind::Filtered { filter, aggregator } => {
                Op::Filtered(filter.compile()?, Box::new(Op::compile(aggregator)?))
            }
        })
    }

    fn init(&self) -> AggState {
        match self {
            Op::Count => AggState::Count(0),
            Op::LongSum(_) => AggState::LongSum(0),
            Op::DoubleSum(_) => AggState::DoubleSum(0.0),
            Op::Min(_) => AggState::Min(f64::INFINITY),
            Op::Max(_) => AggState::Max(f64::NEG_INFINITY),
            Op::Unique(_) => AggState::Sketch(HyperLogLog::new()),
            Op::Filtered(_, inner) => inner.init(),
        }
    }

    fn fold(&self, state: &mut AggState, row: &dyn RowView) {
        match (self, state) {
            (Op::Count, AggState::Count(n)) => *n += 1,
            (Op::LongSum(field), AggState::LongSum(sum)) => {
                // Two's-complement wraparound, like a 64-bit long
                if let Some(v) = row.metric(field) {
                    *sum = sum.wrapping_add(v.number() as i64);
                }
            }
            (Op::DoubleSum(field), AggState::DoubleSum(sum)) => {
                if let Some(v) = row.metric(field) {
                    *sum += v.number();
                }
            }
            (Op::Min(field), AggState::Min(min)) => {
                if let Some(v) = row.metric(field) {
                    *min = min.min(v.number());
                }
            }
            (Op::Max(field), AggState::Max(max)) => {
                if let Some(v) = row.metric(field) {
                    *max = max.max(v.number());
                }
            }
            (Op::Unique(field), AggState::Sketch(sketch)) => {
                if let Some(dim) = row.dimension(field) {
                    for value in dim.values() {
                        sketch.add(value.as_bytes());
                    }
                } else if let Some(metric) = row.metric(field) {
                    match metric.sketch() {
                        Some(stored) => sketch.union(stored),
                        None => sketch.add(metric.number().to_string().as_bytes()),
                    }
                }
            }
            (Op::Filtered(filter, inner), state) => {
                if filter.matches(row) {
                    inner.fold(state, row);
                }
            }
            // States are always created by `init` of the same op
            _ => {}
        }
    }
}

/// A compiled aggregator
#[derive(Debug, Clone)]
pub struct Aggregator {
    name: String,
    op: Op,
}

impl Aggregator {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Empty state
    pub fn init(&self) -> AggState {
        self.op.init()
    }

    /// Fold one row into `state`
    pub fn fold(&self, state: &mut AggState, row: &dyn RowView) {
        self.op.fold(state, row)
    }
}

/// Intermediate aggregation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggState {
    Count(u64),
    LongSum(i64),
    DoubleSum(f64),
    Min(f64),
    Max(f64),
    Sketch(HyperLogLog),
}

impl AggState {
    fn label(&self) -> &'static str {
        match self {
            AggState::Count(_) => "count",
            AggState::LongSum(_) => "longSum",
            AggState::DoubleSum(_) => "doubleSum",
            AggState::Min(_) => "doubleMin",
            AggState::Max(_) => "doubleMax",
            AggState::Sketch(_) => "hyperUnique",
        }
    }

    /// Merge another state of the same kind into this one
    pub fn combine(&mut self, other: &AggState) -> Result<(), AggregationError> {
        match (self, other) {
            (AggState::Count(a), AggState::Count(b)) => *a += b,
            (AggState::LongSum(a), AggState::LongSum(b)) => *a = a.wrapping_add(*b),
            (AggState::DoubleSum(a), AggState::DoubleSum(b)) => *a += b,
            (AggState::Min(a), AggState::Min(b)) => *a = a.min(*b),
            (AggState::Max(a), AggState::Max(b)) => *a = a.max(*b),
            (AggState::Sketch(a), AggState::Sketch(b)) => a.union(b),
            (left, right) => {
                return Err(AggregationError::IncompatibleStates {
                    left: left.label().to_string(),
                    right: right.label().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Final numeric value
    pub fn finalize(&self) -> f64 {
        match self {
            AggState::Count(n) => *n as f64,
            AggState::LongSum(v) => *v as f64,
            AggState::DoubleSum(v) | AggState::Min(v) | AggState::Max(v) => *v,
            AggState::Sketch(sketch) => sketch.estimate(),
        }
    }
}

impl std::fmt::Display for AggregatorDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind.label(), self.name)
    }
}
