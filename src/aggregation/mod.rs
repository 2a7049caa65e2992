//! Aggregators and dimension filters
//!
//! Everything the mutable index, the merger and the query runner need to
//! fold rows into intermediate states:
//!
//! - **aggregator**: Aggregator definitions, compiled aggregators, states
//! - **filter**: Dimension predicates (selector, bound, regex, search, in, and/or/not)
//! - **sketch**: HyperLogLog sketch backing approximate distinct counts
//!
//! Aggregators read their inputs through [`RowView`], which is implemented
//! by raw rows at ingestion time and by stored facts at query time. A query
//! `count` therefore counts facts, and a `longSum` over a stored count column
//! sums the original row counts.

mod aggregator;
mod filter;
mod sketch;

pub use aggregator::{AggState, Aggregator, AggregatorDef, AggregatorKind};
pub use filter::{CompiledFilter, DimFilter, StringOrdering};
pub use sketch::HyperLogLog;

use crate::storage::DimValue;
use thiserror::Error;

/// Errors raised while compiling or evaluating aggregators
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Regex filter did not compile
    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// Two states of different kinds were combined
    #[error("Cannot combine {left} state with {right} state")]
    IncompatibleStates { left: String, right: String },
}

/// A metric value as seen by an aggregator
#[derive(Debug, Clone, Copy)]
pub enum MetricRef<'a> {
    /// Raw numeric input from a row
    Number(f64),
    /// Intermediate state stored in a fact
    State(&'a AggState),
}

impl<'a> MetricRef<'a> {
    /// Numeric value, finalizing stored states
    pub fn number(&self) -> f64 {
        match self {
            MetricRef::Number(v) => *v,
            MetricRef::State(state) => state.finalize(),
        }
    }

    /// The stored sketch, if this value is one
    pub fn sketch(&self) -> Option<&'a HyperLogLog> {
        match self {
            MetricRef::State(AggState::Sketch(sketch)) => Some(sketch),
            _ => None,
        }
    }
}

/// Read access to one row-like record
pub trait RowView {
    /// Timestamp in milliseconds (truncated for stored facts)
    fn timestamp(&self) -> i64;

    /// Value of a dimension, `None` when the record has no such dimension
    fn dimension(&self, name: &str) -> Option<&DimValue>;

    /// Value of a metric column, `None` when absent
    fn metric(&self, name: &str) -> Option<MetricRef<'_>>;
}
