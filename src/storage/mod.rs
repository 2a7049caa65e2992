//! Segment storage
//!
//! This module provides the immutable side of the pipeline:
//!
//! - **types**: Core data structures (Row, Fact, DimValue, TimeRange, Granularity)
//! - **compression**: Dictionary-encoded column blocks + LZ4 compression
//! - **segment**: Segment file format, builder and memory-mapped reader
//! - **io**: Persist/load/merge capability traits
//! - **merge**: K-way merge with rollup
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Persist Path:
//!   IncrementalIndex → sorted facts → Compress blocks → Segment
//!
//! Merge Path:
//!   Segments → min-heap on (timestamp, dims) → combine equal keys → Segment
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use segmill::aggregation::AggregatorDef;
//! use segmill::index::{IncrementalIndex, IndexSchema, IndexType};
//! use segmill::storage::{IndexIo, IndexSpec, Row, SegmentReader, SegmentWriter};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Arc::new(IndexSchema::new(
//!         vec!["country".into()],
//!         vec![AggregatorDef::count("rows")],
//!     ));
//!     let mut index = IncrementalIndex::new(schema, IndexType::OnHeap, 10_000)?;
//!     index.append(&Row::new(0).dim("country", "nl"))?;
//!
//!     let segment = IndexIo.persist(&index, "./segment".as_ref(), &IndexSpec::default())?;
//!     let reopened = IndexIo.load(segment.path())?;
//!     println!("{} facts", reopened.fact_count());
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod io;
pub mod merge;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use compression::{
    compress_block, compression_stats, decompress_block, ColumnBatch, CompressionStats,
    DictColumn,
};
pub use error::{StorageError, StorageResult};
pub use io::{IndexIo, SegmentMerger, SegmentReader, SegmentWriter};
pub use merge::IndexMerger;
pub use segment::{
    BlockMeta, CompressionType, FactCursor, IndexSpec, SegmentBuilder, SegmentHandle,
    SegmentHeader, SegmentMeta, SEGMENT_FILE_NAME,
};
pub use types::{DimValue, Fact, Granularity, Row, TimeRange};
