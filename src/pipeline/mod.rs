//! Ingestion pipeline
//!
//! - **orchestrator**: [`Pipeline`] runs ingest, threshold persist and merge
//! - **toolbox**: Process-wide writer, reader and merger
//! - **report**: Per-run and per-benchmark statistics

mod orchestrator;
mod report;
mod toolbox;

pub use orchestrator::{Pipeline, RunArtifacts, RunMode, RunPhase};
pub use report::{BenchSummary, MergeStats, PersistStats, RunReport};
pub use toolbox::Toolbox;
