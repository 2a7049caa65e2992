//! Query error types
//!
//! Defines all error conditions that can occur during query parsing and execution.
//! None of them leave index or segment state modified.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Filter expression parsing failed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filter is structurally valid but cannot be evaluated
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Aggregator or filter failed to compile or combine
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] crate::aggregation::AggregationError),

    /// Vectorized execution was forced on a source without a vector path
    #[error("Vectorized execution not supported by {0}")]
    VectorizationUnsupported(String),

    /// Query definition is incomplete or inconsistent
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
