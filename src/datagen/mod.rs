//! Synthetic data for ingestion and query benchmarks
//!
//! - **schema**: Column distributions, benchmark aggregators and filters
//! - **generator**: Seeded, restartable [`RowGenerator`]

mod generator;
mod schema;

pub use generator::{RowGenerator, DEFAULT_SEED};
pub use schema::{
    benchmark_filter, filtered_count, ColumnKind, ColumnSchema, SchemaInfo, SCHEMA_NAMES,
};
