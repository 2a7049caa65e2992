//! Mutable index
//!
//! Rows are appended to an [`IncrementalIndex`] until the pipeline decides to
//! persist it:
//!
//! - **schema**: Dimensions, aggregators, granularity and rollup flag
//! - **store**: Backend variants behind the `FactStore` strategy
//! - **incremental**: The index itself (append, size, close)
//!
//! # Architecture
//!
//! ```text
//! Row → truncate timestamp → dimension tuple → FactStore
//!                                  │
//!            rollup: fold into existing fact, else new fact
//!                                  │
//!             sorted_facts() → SegmentBuilder (persist)
//! ```

mod incremental;
mod schema;
mod store;

pub use incremental::IncrementalIndex;
pub use schema::{ColumnLookup, FactView, IndexSchema, IndexType};
pub use store::{new_store, FactKey, FactStore, OnHeapStore, SortedStore};
