//! Query Executor
//!
//! Runs a [`TimeseriesQuery`] against anything implementing [`QuerySource`]:
//! the mutable [`IncrementalIndex`] or a persisted [`SegmentHandle`].
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → compile aggregators/filter → scan (scalar | vectorized)
//!       → bucket by granularity → fold → finalize → Result
//! ```
//!
//! The scalar path evaluates the filter per fact. The vectorized path is
//! only offered by segments: each block's filter is evaluated once per
//! dictionary entry and mapped over the row ids.

use crate::aggregation::{AggState, Aggregator, CompiledFilter, MetricRef, RowView};
use crate::index::{ColumnLookup, IncrementalIndex};
use crate::query::ast::{TimeseriesQuery, VectorizeMode};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{ColumnBatch, DimValue, Granularity, SegmentHandle, TimeRange};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Result of a query execution
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// Column names (aggregator names)
    pub columns: Vec<String>,
    /// Result rows, one per bucket
    pub rows: Vec<ResultRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of facts read inside the interval
    pub rows_scanned: usize,
    /// Whether the vectorized path ran
    pub vectorized: bool,
}

impl QueryOutput {
    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// (timestamp, value) pairs of one column
    pub fn column(&self, name: &str) -> Vec<(i64, f64)> {
        self.rows
            .iter()
            .filter_map(|row| row.values.get(name).map(|v| (row.timestamp, *v)))
            .collect()
    }
}

/// A single result row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Bucket start
    pub timestamp: i64,
    /// Values keyed by column name
    pub values: HashMap<String, f64>,
}

impl ResultRow {
    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

/// Something a query can read facts from
pub trait QuerySource {
    /// Short description for logs and errors
    fn describe(&self) -> String;

    /// Visit every fact whose timestamp lies in `interval`, returning how
    /// many were visited
    fn scan(&self, interval: &TimeRange, visit: &mut dyn FnMut(&dyn RowView))
        -> QueryResult<usize>;

    /// Vectorized scan: visits only facts in `interval` that pass `filter`
    /// and returns how many facts were read. `None` when unsupported.
    fn vector_scan(
        &self,
        _interval: &TimeRange,
        _filter: Option<&CompiledFilter>,
        _vector_size: usize,
        _visit: &mut dyn FnMut(&dyn RowView),
    ) -> Option<QueryResult<usize>> {
        None
    }
}

impl QuerySource for IncrementalIndex {
    fn describe(&self) -> String {
        format!("incremental index ({})", self.index_type())
    }

    fn scan(
        &self,
        interval: &TimeRange,
        visit: &mut dyn FnMut(&dyn RowView),
    ) -> QueryResult<usize> {
        let mut scanned = 0;
        IncrementalIndex::scan(self, &mut |fact| {
            if interval.contains(fact.timestamp) {
                scanned += 1;
                visit(fact);
            }
        })?;
        Ok(scanned)
    }
}

/// One row of a decoded block
struct BatchRow<'a> {
    lookup: &'a ColumnLookup,
    batch: &'a ColumnBatch,
    row: usize,
}

impl RowView for BatchRow<'_> {
    fn timestamp(&self) -> i64 {
        self.batch.timestamps[self.row]
    }

    fn dimension(&self, name: &str) -> Option<&DimValue> {
        self.lookup
            .dimension(name)
            .and_then(|i| self.batch.dimensions.get(i))
            .and_then(|col| col.value(self.row))
    }

    fn metric(&self, name: &str) -> Option<MetricRef<'_>> {
        self.lookup
            .metric(name)
            .and_then(|i| self.batch.metrics.get(i))
            .and_then(|col| col.get(self.row))
            .map(MetricRef::State)
    }
}

/// Decode every block of `segment` overlapping `interval`
fn overlapping_batches<'a>(
    segment: &'a SegmentHandle,
    interval: &'a TimeRange,
) -> impl Iterator<Item = QueryResult<ColumnBatch>> + 'a {
    segment
        .blocks()
        .iter()
        .enumerate()
        .filter(move |(_, block)| block.overlaps(interval))
        .map(move |(idx, _)| segment.read_block(idx).map_err(QueryError::from))
}

impl QuerySource for SegmentHandle {
    fn describe(&self) -> String {
        format!("segment {}", self.path().display())
    }

    fn scan(
        &self,
        interval: &TimeRange,
        visit: &mut dyn FnMut(&dyn RowView),
    ) -> QueryResult<usize> {
        let lookup = ColumnLookup::new(self.schema());
        let mut scanned = 0;
        for batch in overlapping_batches(self, interval) {
            let batch = batch?;
            for row in 0..batch.len() {
                if interval.contains(batch.timestamps[row]) {
                    scanned += 1;
                    visit(&BatchRow {
                        lookup: &lookup,
                        batch: &batch,
                        row,
                    });
                }
            }
        }
        Ok(scanned)
    }

    fn vector_scan(
        &self,
        interval: &TimeRange,
        filter: Option<&CompiledFilter>,
        vector_size: usize,
        visit: &mut dyn FnMut(&dyn RowView),
    ) -> Option<QueryResult<usize>> {
        let lookup = ColumnLookup::new(self.schema());
        let dimensions = &self.schema().dimensions;

        let mut run = || -> QueryResult<usize> {
            let mut scanned = 0;
            for batch in overlapping_batches(self, interval) {
                let batch = batch?;
                let mask = filter.map(|f| f.matches_batch(&batch, dimensions));

                let mut start = 0;
                while start < batch.len() {
                    let end = (start + vector_size).min(batch.len());
                    for row in start..end {
                        if !interval.contains(batch.timestamps[row]) {
                            continue;
                        }
                        scanned += 1;
                        if mask.as_ref().map_or(true, |m| m[row]) {
                            visit(&BatchRow {
                                lookup: &lookup,
                                batch: &batch,
                                row,
                            });
                        }
                    }
                    start = end;
                }
            }
            Ok(scanned)
        };

        Some(run())
    }
}

/// Executes timeseries queries
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryRunner;

impl QueryRunner {
    pub fn new() -> Self {
        Self
    }

    /// Execute `query` against `source`
    pub fn run(&self, query: &TimeseriesQuery, source: &dyn QuerySource) -> QueryResult<QueryOutput> {
        let start = Instant::now();

        let aggregators = query
            .aggregators
            .iter()
            .map(|def| def.compile())
            .collect::<Result<Vec<_>, _>>()?;
        let filter = query.filter.as_ref().map(|f| f.compile()).transpose()?;

        let mut buckets = Buckets::new(query, &aggregators);

        let (rows_scanned, vectorized) = match query.context.vectorize {
            VectorizeMode::False => {
                (Self::scalar(query, source, filter.as_ref(), &mut buckets)?, false)
            }
            mode => {
                let result = source.vector_scan(
                    &query.interval,
                    filter.as_ref(),
                    query.context.vector_size,
                    &mut |row| buckets.fold(row),
                );
                match (result, mode) {
                    (Some(scanned), _) => (scanned?, true),
                    (None, VectorizeMode::Force) => {
                        return Err(QueryError::VectorizationUnsupported(source.describe()));
                    }
                    (None, _) => {
                        tracing::warn!(
                            "{} cannot vectorize, falling back to scalar execution",
                            source.describe()
                        );
                        (Self::scalar(query, source, filter.as_ref(), &mut buckets)?, false)
                    }
                }
            }
        };

        let rows = buckets.finish(query.descending);

        tracing::debug!(
            "Query over {} scanned {} facts into {} rows (vectorized: {})",
            source.describe(),
            rows_scanned,
            rows.len(),
            vectorized
        );

        Ok(QueryOutput {
            columns: query.columns(),
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
            rows_scanned,
            vectorized,
        })
    }

    fn scalar(
        query: &TimeseriesQuery,
        source: &dyn QuerySource,
        filter: Option<&CompiledFilter>,
        buckets: &mut Buckets<'_>,
    ) -> QueryResult<usize> {
        source.scan(&query.interval, &mut |row| {
            if filter.map_or(true, |f| f.matches(row)) {
                buckets.fold(row);
            }
        })
    }
}

/// Per-bucket aggregator states
struct Buckets<'a> {
    granularity: Granularity,
    interval_start: i64,
    aggregators: &'a [Aggregator],
    names: Vec<String>,
    states: BTreeMap<i64, Vec<AggState>>,
}

impl<'a> Buckets<'a> {
    fn new(query: &TimeseriesQuery, aggregators: &'a [Aggregator]) -> Self {
        let mut buckets = Self {
            granularity: query.granularity,
            interval_start: query.interval.start,
            aggregators,
            names: query.columns(),
            states: BTreeMap::new(),
        };
        // `all` always answers with exactly one row
        if buckets.granularity == Granularity::All {
            let initial = buckets.initial();
            buckets.states.insert(buckets.interval_start, initial);
        }
        buckets
    }

    fn initial(&self) -> Vec<AggState> {
        self.aggregators.iter().map(|a| a.init()).collect()
    }

    fn fold(&mut self, row: &dyn RowView) {
        let key = match self.granularity {
            Granularity::All => self.interval_start,
            g => g.truncate(row.timestamp()),
        };
        let aggregators = self.aggregators;
        let states = self
            .states
            .entry(key)
            .or_insert_with(|| aggregators.iter().map(|a| a.init()).collect());
        for (agg, state) in aggregators.iter().zip(states.iter_mut()) {
            agg.fold(state, row);
        }
    }

    fn finish(self, descending: bool) -> Vec<ResultRow> {
        let names = self.names;
        let mut rows: Vec<ResultRow> = self
            .states
            .into_iter()
            .map(|(timestamp, states)| ResultRow {
                timestamp,
                values: names
                    .iter()
                    .cloned()
                    .zip(states.iter().map(|s| s.finalize()))
                    .collect(),
            })
            .collect();
        if descending {
            rows.reverse();
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggregatorDef, AggregatorKind, DimFilter, StringOrdering};
    use crate::index::{IndexSchema, IndexType};
    use crate::query::ast::TimeseriesQueryBuilder;
    use crate::storage::{IndexIo, IndexSpec, Row, SegmentWriter};
    use std::sync::Arc;
    use tempfile::tempdir;

    const HOUR: i64 = 3_600_000;

    fn schema() -> Arc<IndexSchema> {
        Arc::new(IndexSchema::new(
            vec!["dimSequential".into(), "dimZipf".into()],
            vec![
                AggregatorDef::count("rows"),
                AggregatorDef::double_sum("spend", "spend"),
                AggregatorDef::hyper_unique("users", "dimSequential"),
            ],
        ))
    }

    fn index() -> IncrementalIndex {
        let mut index = IncrementalIndex::new(schema(), IndexType::OnHeap, 10_000).unwrap();
        for i in 0..400i64 {
            let row = Row::new((i % 48) * HOUR / 2)
                .dim("dimSequential", (i % 20).to_string())
                .dim("dimZipf", if i % 3 == 0 { "hot" } else { "cold" })
                .metric("spend", (i % 7) as f64);
            index.append(&row).unwrap();
        }
        index
    }

    fn base() -> TimeseriesQueryBuilder {
        TimeseriesQuery::builder(TimeRange::new(0, 24 * HOUR))
            .aggregator(AggregatorDef::count("facts"))
            .aggregator(AggregatorDef::long_sum("rows", "rows"))
            .aggregator(AggregatorDef::double_sum("spend", "spend"))
            .aggregator(AggregatorDef::filtered(
                "hot_rows",
                DimFilter::selector("dimZipf", "hot"),
                AggregatorKind::LongSum {
                    field: "rows".into(),
                },
            ))
    }

    fn persisted(index: &IncrementalIndex, dir: &std::path::Path) -> SegmentHandle {
        let spec = IndexSpec {
            block_rows: 16,
            ..IndexSpec::default()
        };
        IndexIo.persist(index, dir, &spec).unwrap()
    }

    #[test]
    fn test_all_granularity_single_row() {
        let index = index();
        let query = base().build().unwrap();
        let out = QueryRunner::new().run(&query, &index).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0].timestamp, 0);
        assert_eq!(out.rows[0].get("rows"), Some(400.0));
        assert_eq!(out.rows[0].get("facts"), Some(index.size() as f64));
        assert!(out.rows[0].get("hot_rows").unwrap() > 0.0);
        assert!(!out.vectorized);
    }

    #[test]
    fn test_all_granularity_empty_interval_still_one_row() {
        let index = index();
        let query = base()
            .aggregator(AggregatorDef::double_max("max_spend", "spend"))
            .build()
            .unwrap();
        let query = TimeseriesQuery {
            interval: TimeRange::new(100 * HOUR, 101 * HOUR),
            ..query
        };

        let out = QueryRunner::new().run(&query, &index).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0].timestamp, 100 * HOUR);
        assert_eq!(out.rows[0].get("rows"), Some(0.0));
        assert_eq!(out.rows_scanned, 0);
    }

    #[test]
    fn test_hour_buckets_and_descending() {
        let index = index();
        let asc = base().granularity(Granularity::Hour).build().unwrap();
        let out = QueryRunner::new().run(&asc, &index).unwrap();
        assert_eq!(out.len(), 24);
        assert!(out.rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let total: f64 = out.column("rows").iter().map(|(_, v)| v).sum();
        assert_eq!(total, 400.0);

        let desc = base().granularity(Granularity::Hour).descending(true).build().unwrap();
        let mut reversed = QueryRunner::new().run(&desc, &index).unwrap().rows;
        reversed.reverse();
        assert_eq!(reversed, out.rows);
    }

    #[test]
    fn test_mutable_and_persisted_agree() {
        let dir = tempdir().unwrap();
        let index = index();
        let segment = persisted(&index, dir.path());

        let filters = [
            None,
            Some(DimFilter::selector("dimSequential", "7")),
            Some(DimFilter::bound("dimSequential", "3", "12", false, StringOrdering::Numeric)),
            Some(DimFilter::or(vec![
                DimFilter::regex("dimSequential", "^1"),
                DimFilter::not(DimFilter::in_values("dimZipf", ["cold"])),
            ])),
        ];

        for filter in filters {
            let mut builder = base().granularity(Granularity::Hour);
            if let Some(f) = filter.clone() {
                builder = builder.filter(f);
            }
            let query = builder.build().unwrap();

            let mutable = QueryRunner::new().run(&query, &index).unwrap();
            let scalar = QueryRunner::new().run(&query, &segment).unwrap();
            let vector_query = TimeseriesQuery {
                context: crate::query::QueryContext {
                    vectorize: VectorizeMode::Force,
                    vector_size: 5,
                },
                ..query.clone()
            };
            let vector = QueryRunner::new().run(&vector_query, &segment).unwrap();

            assert_eq!(mutable.rows, scalar.rows, "filter {:?}", filter);
            assert_eq!(scalar.rows, vector.rows, "filter {:?}", filter);
            assert!(vector.vectorized);
            assert_eq!(scalar.rows_scanned, vector.rows_scanned);
        }
    }

    #[test]
    fn test_index_vectorize_fallback_and_force() {
        let index = index();
        let scalar = base().build().unwrap();
        let fallback = base().vectorize(VectorizeMode::True).build().unwrap();
        let forced = base().vectorize(VectorizeMode::Force).build().unwrap();

        let expected = QueryRunner::new().run(&scalar, &index).unwrap();
        let out = QueryRunner::new().run(&fallback, &index).unwrap();
        assert_eq!(out.rows, expected.rows);
        assert!(!out.vectorized);

        let err = QueryRunner::new().run(&forced, &index).unwrap_err();
        assert!(matches!(err, QueryError::VectorizationUnsupported(_)));
    }

    #[test]
    fn test_hyper_unique_over_stored_sketches() {
        let dir = tempdir().unwrap();
        let index = index();
        let segment = persisted(&index, dir.path());

        let query = TimeseriesQuery::builder(TimeRange::eternity())
            .aggregator(AggregatorDef::hyper_unique("users", "users"))
            .vectorize(VectorizeMode::True)
            .build()
            .unwrap();

        let out = QueryRunner::new().run(&query, &segment).unwrap();
        let estimate = out.rows[0].get("users").unwrap();
        assert!((estimate - 20.0).abs() < 2.0, "estimate {}", estimate);
    }

    #[test]
    fn test_invalid_regex_is_query_error() {
        let index = index();
        let query = base()
            .filter(DimFilter::regex("dimSequential", "("))
            .build()
            .unwrap();
        let err = QueryRunner::new().run(&query, &index).unwrap_err();
        assert!(matches!(err, QueryError::Aggregation(_)));
        assert_eq!(index.rows_ingested(), 400);
    }
}
