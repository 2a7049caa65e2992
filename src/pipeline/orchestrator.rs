//! Ingest → persist → rollover → merge driver
//!
//! A run pulls rows into a mutable index, persists the index whenever its
//! fact count reaches the threshold (or the input ends), starts a fresh
//! index, and optionally merges every persisted segment at the end.
//!
//! # Run lifecycle
//!
//! ```text
//! Empty → Filling ⇄ Persisting → Draining → Merging → Done
//!                                              any error → Failed
//! ```
//!
//! Every directory a run writes to lives under a per-run scratch root owned
//! by [`RunState`]. The root is removed on every exit path: explicitly at
//! the end of the run, or from `Drop` if the run unwinds.

use crate::aggregation::AggregatorDef;
use crate::config::PipelineConfig;
use crate::datagen::SchemaInfo;
use crate::index::{IncrementalIndex, IndexSchema};
use crate::pipeline::report::{MergeStats, PersistStats, RunReport};
use crate::pipeline::toolbox::Toolbox;
use crate::storage::{Row, SegmentHandle, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use uuid::Uuid;

/// How far a run goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Ingest only; full indexes are discarded
    Add,
    /// Ingest and persist every batch
    Persist,
    /// Ingest, persist, then merge all segments
    #[default]
    Merge,
}

impl RunMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "persist" => Some(Self::Persist),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Persist => write!(f, "persist"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Empty,
    Filling,
    Persisting,
    Draining,
    Merging,
    Done,
    Failed,
}

/// What a finished run produced, visible before cleanup
#[derive(Debug)]
pub struct RunArtifacts<'a> {
    pub run_id: Uuid,
    pub phase: RunPhase,
    /// Persisted segments in batch order
    pub segments: Vec<&'a SegmentHandle>,
    pub merged: Option<&'a SegmentHandle>,
}

/// A persist directory and the segment written into it
struct PersistedSegment {
    dir: TempDir,
    handle: Option<SegmentHandle>,
}

/// Everything one run owns
///
/// Directories are registered before anything is written to them, so
/// cleanup covers partially written output too.
struct RunState {
    run_id: Uuid,
    phase: RunPhase,
    index: Option<IncrementalIndex>,
    segments: Vec<PersistedSegment>,
    merge_dir: Option<TempDir>,
    merged: Option<SegmentHandle>,
    root: Option<TempDir>,
}

impl RunState {
    fn new(run_id: Uuid, scratch: &std::path::Path) -> StorageResult<Self> {
        std::fs::create_dir_all(scratch)?;
        let root = tempfile::Builder::new()
            .prefix("segmill-run-")
            .tempdir_in(scratch)?;
        tracing::debug!("Run {} scratch root {:?}", run_id, root.path());

        Ok(Self {
            run_id,
            phase: RunPhase::Empty,
            index: None,
            segments: Vec::new(),
            merge_dir: None,
            merged: None,
            root: Some(root),
        })
    }

    fn transition(&mut self, phase: RunPhase) {
        tracing::debug!("Run {} {:?} -> {:?}", self.run_id, self.phase, phase);
        self.phase = phase;
    }

    fn root_path(&self) -> StorageResult<PathBuf> {
        self.root
            .as_ref()
            .map(|r| r.path().to_path_buf())
            .ok_or_else(|| StorageError::Config("Run scratch root already removed".into()))
    }

    /// Create and record the directory for the next persist
    fn register_persist_dir(&mut self) -> StorageResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("segmill-persist-")
            .tempdir_in(self.root_path()?)?;
        let path = dir.path().to_path_buf();
        self.segments.push(PersistedSegment { dir, handle: None });
        Ok(path)
    }

    fn register_merge_dir(&mut self) -> StorageResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("segmill-merge-")
            .tempdir_in(self.root_path()?)?;
        let path = dir.path().to_path_buf();
        self.merge_dir = Some(dir);
        Ok(path)
    }

    fn index(&self) -> StorageResult<&IncrementalIndex> {
        self.index.as_ref().ok_or(StorageError::IndexClosed)
    }

    fn index_mut(&mut self) -> StorageResult<&mut IncrementalIndex> {
        self.index.as_mut().ok_or(StorageError::IndexClosed)
    }

    fn artifacts(&self) -> RunArtifacts<'_> {
        RunArtifacts {
            run_id: self.run_id,
            phase: self.phase,
            segments: self.segments.iter().filter_map(|s| s.handle.as_ref()).collect(),
            merged: self.merged.as_ref(),
        }
    }

    /// Close the index and delete every directory; the first failure is
    /// returned after all steps ran
    fn cleanup(&mut self) -> StorageResult<()> {
        let mut first_error: Option<StorageError> = None;
        let mut record = |error: StorageError, what: &str| {
            tracing::warn!("Run cleanup failed to {}: {}", what, error);
            first_error.get_or_insert(error);
        };

        if let Some(mut index) = self.index.take() {
            if !index.is_closed() {
                if let Err(e) = index.close() {
                    record(e, "close index");
                }
            }
        }

        // Handles unmap before their files go
        self.merged = None;
        if let Some(dir) = self.merge_dir.take() {
            if let Err(e) = dir.close() {
                record(e.into(), "remove merge directory");
            }
        }

        for segment in self.segments.drain(..) {
            drop(segment.handle);
            if let Err(e) = segment.dir.close() {
                record(e.into(), "remove segment directory");
            }
        }

        if let Some(root) = self.root.take() {
            if let Err(e) = root.close() {
                record(e.into(), "remove scratch root");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for RunState {
    fn drop(&mut self) {
        if self.root.is_some() {
            if let Err(e) = self.cleanup() {
                tracing::warn!("Cleanup of run {} during drop failed: {}", self.run_id, e);
            }
        }
    }
}

/// Drives pipeline runs for one schema
#[derive(Debug)]
pub struct Pipeline<'t> {
    config: PipelineConfig,
    schema: Arc<IndexSchema>,
    toolbox: &'t Toolbox,
}

impl<'t> Pipeline<'t> {
    /// Pipeline over explicit dimensions and aggregators
    pub fn new(
        config: PipelineConfig,
        dimensions: Vec<String>,
        aggregators: Vec<AggregatorDef>,
        toolbox: &'t Toolbox,
    ) -> StorageResult<Self> {
        config.validate()?;
        let schema = IndexSchema::new(dimensions, aggregators)
            .with_rollup(config.rollup)
            .with_granularity(config.granularity);
        schema.validate()?;

        Ok(Self {
            config,
            schema: Arc::new(schema),
            toolbox,
        })
    }

    /// Pipeline over the generator schema named in the config
    pub fn for_schema(config: PipelineConfig, toolbox: &'t Toolbox) -> StorageResult<Self> {
        let info = SchemaInfo::by_name(&config.schema)
            .ok_or_else(|| StorageError::Config(format!("Unknown schema '{}'", config.schema)))?;
        Self::new(config, info.dimensions(), info.aggregators, toolbox)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    /// Run over `rows`
    pub fn run(&self, rows: impl IntoIterator<Item = Row>, mode: RunMode) -> StorageResult<RunReport> {
        self.run_inspect(rows, mode, |_| Ok(())).map(|(report, _)| report)
    }

    /// Run over `rows`, handing the produced segments to `inspect` before
    /// they are deleted
    pub fn run_inspect<T>(
        &self,
        rows: impl IntoIterator<Item = Row>,
        mode: RunMode,
        inspect: impl FnOnce(&RunArtifacts<'_>) -> StorageResult<T>,
    ) -> StorageResult<(RunReport, T)> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, %mode);
        let _guard = span.enter();

        let scratch = self
            .config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let mut state = RunState::new(run_id, &scratch)?;

        let outcome = self
            .drive(&mut state, rows.into_iter(), mode)
            .and_then(|report| inspect(&state.artifacts()).map(|value| (report, value)));

        if outcome.is_err() {
            state.transition(RunPhase::Failed);
        }
        let cleanup = state.cleanup();

        match (outcome, cleanup) {
            (Ok(done), Ok(())) => {
                tracing::info!("{}", done.0);
                Ok(done)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => {
                tracing::warn!("Run {} failed: {}", run_id, e);
                Err(e)
            }
            (Err(e), Err(cleanup_error)) => {
                tracing::warn!(
                    "Run {} failed: {} (cleanup also failed: {})",
                    run_id,
                    e,
                    cleanup_error
                );
                Err(e)
            }
        }
    }

    fn new_index(&self) -> StorageResult<IncrementalIndex> {
        IncrementalIndex::new(
            self.schema.clone(),
            self.config.index_type,
            self.config.effective_max_row_count(),
        )
    }

    fn drive(
        &self,
        state: &mut RunState,
        rows: impl Iterator<Item = Row>,
        mode: RunMode,
    ) -> StorageResult<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new(state.run_id, mode);
        let threshold = self.config.max_rows_before_persist;

        state.index = Some(self.new_index()?);
        state.transition(RunPhase::Filling);

        let mut rows = rows.peekable();
        while let Some(row) = rows.next() {
            let facts = state.index_mut()?.append(&row)?;
            report.rows_ingested += 1;

            let last = rows.peek().is_none();
            if facts >= threshold || last {
                self.rollover(state, mode, last, &mut report)?;
            }
        }
        if state.phase != RunPhase::Draining {
            state.transition(RunPhase::Draining);
        }
        report.ingest_elapsed = start.elapsed();

        if mode == RunMode::Merge {
            self.merge(state, &mut report)?;
        }

        state.transition(RunPhase::Done);
        report.total_elapsed = start.elapsed();
        Ok(report)
    }

    /// Persist (unless adding only) and replace the current index
    fn rollover(
        &self,
        state: &mut RunState,
        mode: RunMode,
        last: bool,
        report: &mut RunReport,
    ) -> StorageResult<()> {
        report.batches += 1;

        if mode == RunMode::Add {
            tracing::debug!("Discarding batch of {} facts", state.index()?.size());
        } else {
            state.transition(RunPhase::Persisting);
            let dir = state.register_persist_dir()?;
            let started = Instant::now();

            let index = state.index()?;
            let rows = index.rows_ingested();
            let handle =
                self.toolbox
                    .writer()
                    .persist(index, &dir, self.toolbox.index_spec())?;

            let stats = PersistStats {
                rows,
                facts: handle.fact_count(),
                bytes: handle.size_bytes(),
                elapsed: started.elapsed(),
            };
            tracing::debug!(
                "Persisted batch {}: {} rows as {} facts, {} bytes",
                report.batches,
                stats.rows,
                stats.facts,
                stats.bytes
            );
            report.persists.push(stats);

            if let Some(segment) = state.segments.last_mut() {
                segment.handle = Some(handle);
            }
        }

        if let Some(mut index) = state.index.take() {
            index.close()?;
        }

        if last {
            state.transition(RunPhase::Draining);
        } else {
            state.index = Some(self.new_index()?);
            state.transition(RunPhase::Filling);
        }
        Ok(())
    }

    /// Reload every persisted segment and merge them into one
    fn merge(&self, state: &mut RunState, report: &mut RunReport) -> StorageResult<()> {
        if state.segments.is_empty() {
            tracing::info!("No segments persisted, skipping merge");
            return Ok(());
        }

        state.transition(RunPhase::Merging);
        let started = Instant::now();

        let inputs = state
            .segments
            .iter()
            .map(|s| self.toolbox.reader().load(s.dir.path()))
            .collect::<StorageResult<Vec<_>>>()?;

        let dir = state.register_merge_dir()?;
        let merged = self.toolbox.merger().merge(
            &inputs,
            self.schema.rollup,
            &self.schema.aggregators,
            &dir,
            self.toolbox.index_spec(),
        )?;
        drop(inputs);

        report.merge = Some(MergeStats {
            segments: state.segments.len(),
            facts: merged.fact_count(),
            bytes: merged.size_bytes(),
            elapsed: started.elapsed(),
        });
        state.merged = Some(merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggState, AggregatorKind, DimFilter};
    use crate::datagen::{filtered_count, RowGenerator};
    use crate::storage::DimValue;
    use crate::index::IndexType;
    use crate::storage::{Fact, IndexIo, IndexSpec, SegmentWriter};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn config(scratch: &Path, threshold: usize, rollup: bool) -> PipelineConfig {
        PipelineConfig {
            rows_per_run: 10,
            max_rows_before_persist: threshold,
            rollup,
            scratch_dir: Some(scratch.to_path_buf()),
            ..PipelineConfig::default()
        }
    }

    fn pipeline<'t>(config: PipelineConfig, toolbox: &'t Toolbox) -> Pipeline<'t> {
        Pipeline::new(
            config,
            vec!["page".into()],
            vec![
                AggregatorDef::count("rows"),
                AggregatorDef::long_sum("clicks", "clicks"),
            ],
            toolbox,
        )
        .unwrap()
    }

    fn distinct_rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(1000 + i).dim("page", format!("p{}", i)).metric("clicks", i as f64))
            .collect()
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_ten_rows_threshold_three_without_rollup() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 3, false), &toolbox);

        let (report, (sizes, merged)) = pipeline
            .run_inspect(distinct_rows(10), RunMode::Merge, |artifacts| {
                assert_eq!(artifacts.phase, RunPhase::Done);
                let sizes: Vec<u64> = artifacts.segments.iter().map(|s| s.fact_count()).collect();
                let merged = artifacts.merged.map(|m| m.read_all()).transpose()?;
                Ok((sizes, merged))
            })
            .unwrap();

        assert_eq!(sizes, vec![3, 3, 3, 1]);
        let merged: Vec<Fact> = merged.unwrap();
        assert_eq!(merged.len(), 10);
        let timestamps: Vec<i64> = merged.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, (1000..1010).collect::<Vec<_>>());

        assert_eq!(report.rows_ingested, 10);
        assert_eq!(report.batches, 4);
        assert_eq!(report.persists.iter().map(|p| p.rows).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
        assert_eq!(report.merge.as_ref().map(|m| m.facts), Some(10));
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_same_key_rollup_collapses_batches() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 3, true), &toolbox);
        let rows: Vec<Row> = (0..10)
            .map(|_| Row::new(5000).dim("page", "home").metric("clicks", 1.0))
            .collect();

        let (_, (segments, merged)) = pipeline
            .run_inspect(rows, RunMode::Merge, |artifacts| {
                let segments = artifacts
                    .segments
                    .iter()
                    .map(|s| s.read_all())
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok((segments, artifacts.merged.map(|m| m.read_all()).transpose()?))
            })
            .unwrap();

        // Fact count never reaches the threshold, so the whole run is one batch
        for facts in &segments {
            assert_eq!(facts.len(), 1);
        }
        let batch_total: u64 = segments
            .iter()
            .map(|facts| match facts[0].metrics[0] {
                AggState::Count(n) => n,
                _ => 0,
            })
            .sum();
        assert_eq!(batch_total, 10);

        let merged = merged.unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].metrics[0], AggState::Count(10));
    }

    #[test]
    fn test_rollup_merge_matches_single_index() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::new(IndexSpec {
            block_rows: 7,
            ..IndexSpec::default()
        });
        let schema = SchemaInfo::simple();
        let rows: Vec<Row> = RowGenerator::new(schema.clone(), 5)
            .with_rollup_opportunity(3)
            .take(300)
            .collect();

        let mut cfg = config(scratch.path(), 25, true);
        cfg.schema = "simple".into();
        cfg.rows_per_run = 300;
        let pipeline = Pipeline::for_schema(cfg, &toolbox).unwrap();

        let mut single =
            IncrementalIndex::new(pipeline.schema().clone(), IndexType::Sorted, 1000).unwrap();
        for row in &rows {
            single.append(row).unwrap();
        }
        let expected: Vec<Fact> = single.sorted_facts().unwrap().collect();

        let (report, merged) = pipeline
            .run_inspect(rows, RunMode::Merge, |a| {
                a.merged.map(|m| m.read_all()).transpose()
            })
            .unwrap();

        assert!(report.persists.len() > 1);
        assert_eq!(merged.unwrap(), expected);
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_filtered_aggregators_survive_persist_and_merge() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::new(IndexSpec {
            block_rows: 16,
            ..IndexSpec::default()
        });
        let info = SchemaInfo::basic();
        let aggregators = vec![
            AggregatorDef::count("rows"),
            AggregatorDef::filtered(
                "helloRows",
                DimFilter::selector("dimEnumerated", "Hello"),
                AggregatorKind::Count,
            ),
            filtered_count("filteredRows"),
        ];
        let rows: Vec<Row> = RowGenerator::new(info.clone(), 11)
            .with_rollup_opportunity(2)
            .take(400)
            .collect();

        let mut cfg = config(scratch.path(), 40, true);
        cfg.rows_per_run = 400;
        let pipeline =
            Pipeline::new(cfg, info.dimensions(), aggregators, &toolbox).unwrap();

        let mut single =
            IncrementalIndex::new(pipeline.schema().clone(), IndexType::OnHeap, 400).unwrap();
        for row in &rows {
            single.append(row).unwrap();
        }
        let expected: Vec<Fact> = single.sorted_facts().unwrap().collect();

        let (report, merged) = pipeline
            .run_inspect(rows.clone(), RunMode::Merge, |a| {
                a.merged.map(|m| m.read_all()).transpose()
            })
            .unwrap();
        let merged = merged.unwrap();

        assert!(report.persists.len() > 1);
        assert_eq!(merged, expected);

        let hello_rows = rows
            .iter()
            .filter(|r| r.dimensions.get("dimEnumerated") == Some(&DimValue::from("Hello")))
            .count() as u64;
        let merged_hello: u64 = merged
            .iter()
            .map(|f| match f.metrics[1] {
                AggState::Count(n) => n,
                _ => 0,
            })
            .sum();
        assert!(hello_rows > 0);
        assert_eq!(merged_hello, hello_rows);
        // The benchmark filter matches no generated value
        assert!(merged.iter().all(|f| f.metrics[2] == AggState::Count(0)));
    }

    #[test]
    fn test_capacity_equal_to_threshold_never_overflows() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let mut cfg = config(scratch.path(), 3, false);
        cfg.max_row_count = Some(3);
        let pipeline = pipeline(cfg, &toolbox);

        let report = pipeline.run(distinct_rows(10), RunMode::Merge).unwrap();
        assert_eq!(
            report.persists.iter().map(|p| p.facts).collect::<Vec<_>>(),
            vec![3, 3, 3, 1]
        );
        assert_eq!(report.merge.as_ref().map(|m| m.facts), Some(10));
    }

    #[test]
    fn test_add_mode_persists_nothing() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 4, true), &toolbox);

        let report = pipeline.run(distinct_rows(10), RunMode::Add).unwrap();
        assert_eq!(report.batches, 3);
        assert!(report.persists.is_empty());
        assert!(report.merge.is_none());
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_persist_mode_skips_merge() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 5, true), &toolbox);

        let report = pipeline.run(distinct_rows(10), RunMode::Persist).unwrap();
        assert_eq!(report.persists.len(), 2);
        assert!(report.merge.is_none());
    }

    #[test]
    fn test_empty_input_skips_merge() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 3, true), &toolbox);

        let report = pipeline.run(Vec::new(), RunMode::Merge).unwrap();
        assert_eq!(report.rows_ingested, 0);
        assert!(report.persists.is_empty());
        assert!(report.merge.is_none());
        assert!(is_empty_dir(scratch.path()));
    }

    /// Writer that fails on its nth call after writing partial output
    struct FailingWriter {
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl SegmentWriter for FailingWriter {
        fn persist(
            &self,
            index: &IncrementalIndex,
            output_dir: &Path,
            spec: &IndexSpec,
        ) -> StorageResult<SegmentHandle> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                std::fs::write(output_dir.join("partial"), b"half a segment")?;
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            IndexIo.persist(index, output_dir, spec)
        }
    }

    #[test]
    fn test_failed_persist_cleans_up() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default().with_writer(FailingWriter {
            calls: AtomicUsize::new(0),
            fail_on: 3,
        });
        let pipeline = pipeline(config(scratch.path(), 3, false), &toolbox);

        let err = pipeline.run(distinct_rows(10), RunMode::Merge).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_failed_inspect_cleans_up() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();
        let pipeline = pipeline(config(scratch.path(), 3, false), &toolbox);

        let err = pipeline
            .run_inspect(distinct_rows(5), RunMode::Merge, |_| -> StorageResult<()> {
                Err(StorageError::Config("inspection failed".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_config_validation() {
        let scratch = tempdir().unwrap();
        let toolbox = Toolbox::default();

        let mut cfg = config(scratch.path(), 0, true);
        assert!(Pipeline::new(cfg.clone(), vec![], vec![], &toolbox).is_err());

        cfg.max_rows_before_persist = 50;
        cfg.max_row_count = Some(10);
        let err = Pipeline::new(cfg, vec![], vec![], &toolbox).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));

        let mut cfg = config(scratch.path(), 3, true);
        cfg.schema = "unknown".into();
        assert!(Pipeline::for_schema(cfg, &toolbox).is_err());
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!(RunMode::from_str("Persist"), Some(RunMode::Persist));
        assert_eq!(RunMode::from_str("merge").map(|m| m.to_string()), Some("merge".into()));
        assert_eq!(RunMode::from_str("flush"), None);
    }
}
