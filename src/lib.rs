//! # Segmill
//!
//! Segment build pipeline for a columnar analytics store: rows are rolled up
//! into a mutable in-memory index, persisted to immutable segments whenever a
//! fact threshold is reached, and merged into a single segment at the end of
//! a run. The same timeseries queries run against both forms.
//!
//! ## Features
//!
//! - **Rollup ingestion**: Rows sharing a truncated timestamp and dimension
//!   tuple fold into one fact
//! - **Compact segments**: Dictionary-encoded, LZ4-compressed column blocks
//!   with CRC32 checksums
//! - **K-way merge**: Heap merge of sorted segments, combining equal keys
//! - **Filtered queries**: Scalar and vectorized execution over the same
//!   aggregators
//!
//! ## Modules
//!
//! - [`aggregation`]: Aggregators, states, filters and sketches
//! - [`index`]: The mutable incremental index
//! - [`storage`]: Segment format, persist, load and merge
//! - [`query`]: Timeseries queries and the filter language
//! - [`pipeline`]: Run orchestration and reporting
//! - [`datagen`]: Seeded synthetic rows
//! - [`config`]: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segmill::config::PipelineConfig;
//! use segmill::datagen::{RowGenerator, SchemaInfo};
//! use segmill::pipeline::{Pipeline, RunMode, Toolbox};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let toolbox = Toolbox::default();
//!     let config = PipelineConfig {
//!         rows_per_run: 10_000,
//!         max_rows_before_persist: 2_500,
//!         ..PipelineConfig::default()
//!     };
//!     let pipeline = Pipeline::for_schema(config, &toolbox)?;
//!
//!     let rows = RowGenerator::new(SchemaInfo::basic(), 9999).take(10_000);
//!     let report = pipeline.run(rows, RunMode::Merge)?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod datagen;
pub mod index;
pub mod pipeline;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use aggregation::{AggState, AggregationError, AggregatorDef, AggregatorKind, DimFilter};

pub use storage::{
    Fact, Granularity, IndexIo, IndexMerger, IndexSpec, Row, SegmentHandle, StorageError,
    StorageResult, TimeRange,
};

pub use index::{IncrementalIndex, IndexSchema, IndexType};

pub use query::{
    parse_filter, QueryError, QueryOutput, QueryRunner, QuerySource, TimeseriesQuery,
    VectorizeMode,
};

pub use pipeline::{BenchSummary, Pipeline, RunMode, RunReport, Toolbox};

pub use datagen::{RowGenerator, SchemaInfo};

pub use config::{Config, ConfigError, PipelineConfig};
