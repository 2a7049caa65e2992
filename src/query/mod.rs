//! Query Engine
//!
//! Timeseries aggregate queries over both forms of the index:
//!
//! - **AST**: [`TimeseriesQuery`] and its builder
//! - **Parser**: Textual filter expressions into [`DimFilter`](crate::aggregation::DimFilter)
//! - **Executor**: [`QueryRunner`] over any [`QuerySource`]
//!
//! # Examples
//!
//! ```rust,ignore
//! use segmill::query::{parse_filter, QueryRunner, TimeseriesQuery, VectorizeMode};
//!
//! let query = TimeseriesQuery::builder(interval)
//!     .aggregator(AggregatorDef::count("rows"))
//!     .filter(parse_filter("dimSequential = '7' AND dimZipf IS NOT NULL")?)
//!     .vectorize(VectorizeMode::True)
//!     .build()?;
//!
//! // Same query, mutable or persisted
//! let live = QueryRunner::new().run(&query, &index)?;
//! let disk = QueryRunner::new().run(&query, &segment)?;
//! ```

mod ast;
mod error;
mod executor;
mod parser;

pub use ast::{
    QueryContext, TimeseriesQuery, TimeseriesQueryBuilder, VectorizeMode, DEFAULT_VECTOR_SIZE,
};
pub use error::{QueryError, QueryResult};
pub use executor::{QueryOutput, QueryRunner, QuerySource, ResultRow};
pub use parser::parse_filter;
