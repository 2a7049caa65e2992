//! Mutable, rollup-aggregating in-memory index

use crate::aggregation::{AggState, Aggregator};
use crate::index::schema::{ColumnLookup, FactView, IndexSchema, IndexType};
use crate::index::store::{new_store, FactKey, FactStore};
use crate::storage::{DimValue, Fact, Row, StorageError, StorageResult, TimeRange};
use std::sync::Arc;

/// In-memory index that rows are appended to before persist
///
/// With rollup, rows sharing a truncated timestamp and dimension tuple fold
/// into one fact; without it every row becomes its own fact. The fact count
/// never exceeds `max_row_count`.
pub struct IncrementalIndex {
    schema: Arc<IndexSchema>,
    aggregators: Vec<Aggregator>,
    lookup: ColumnLookup,
    store: Box<dyn FactStore>,
    index_type: IndexType,
    max_row_count: usize,
    next_seq: u64,
    rows_ingested: u64,
    min_timestamp: i64,
    max_timestamp: i64,
    closed: bool,
}

impl std::fmt::Debug for IncrementalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalIndex")
            .field("index_type", &self.index_type)
            .field("facts", &self.store.len())
            .field("max_row_count", &self.max_row_count)
            .field("rollup", &self.schema.rollup)
            .field("closed", &self.closed)
            .finish()
    }
}

impl IncrementalIndex {
    /// Create an empty index
    pub fn new(
        schema: Arc<IndexSchema>,
        index_type: IndexType,
        max_row_count: usize,
    ) -> StorageResult<Self> {
        if max_row_count == 0 {
            return Err(StorageError::Config(
                "max_row_count must be at least 1".into(),
            ));
        }
        schema.validate()?;

        let aggregators = schema
            .aggregators
            .iter()
            .map(|def| def.compile())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            lookup: ColumnLookup::new(&schema),
            schema,
            aggregators,
            store: new_store(index_type),
            index_type,
            max_row_count,
            next_seq: 0,
            rows_ingested: 0,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            closed: false,
        })
    }

    /// Integrate one row, returning the fact count afterwards
    pub fn append(&mut self, row: &Row) -> StorageResult<usize> {
        if self.closed {
            return Err(StorageError::IndexClosed);
        }

        let timestamp = self.schema.granularity.truncate(row.timestamp);
        let dims: Vec<DimValue> = self
            .schema
            .dimensions
            .iter()
            .map(|d| row.dimensions.get(d).cloned().unwrap_or(DimValue::Null))
            .collect();

        let key = FactKey {
            timestamp,
            dims,
            seq: if self.schema.rollup { 0 } else { self.next_seq },
        };

        if self.schema.rollup {
            if let Some(states) = self.store.get_mut(&key) {
                for (agg, state) in self.aggregators.iter().zip(states.iter_mut()) {
                    agg.fold(state, row);
                }
                self.record(timestamp);
                return Ok(self.store.len());
            }
        }

        if self.store.len() >= self.max_row_count {
            return Err(StorageError::CapacityExceeded {
                max_row_count: self.max_row_count,
            });
        }

        let states: Vec<AggState> = self
            .aggregators
            .iter()
            .map(|agg| {
                let mut state = agg.init();
                agg.fold(&mut state, row);
                state
            })
            .collect();
        self.store.insert(key, states);
        self.next_seq += 1;
        self.record(timestamp);

        Ok(self.store.len())
    }

    fn record(&mut self, timestamp: i64) {
        self.rows_ingested += 1;
        self.min_timestamp = self.min_timestamp.min(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);
    }

    /// Current fact count
    pub fn size(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Rows appended so far (before rollup)
    pub fn rows_ingested(&self) -> u64 {
        self.rows_ingested
    }

    pub fn max_row_count(&self) -> usize {
        self.max_row_count
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Interval covering every truncated fact timestamp
    pub fn interval(&self) -> Option<TimeRange> {
        if self.rows_ingested == 0 {
            None
        } else {
            Some(TimeRange::covering(self.min_timestamp, self.max_timestamp))
        }
    }

    /// Facts ordered by (timestamp, dimension tuple, arrival)
    pub fn sorted_facts(&self) -> StorageResult<impl Iterator<Item = Fact> + '_> {
        if self.closed {
            return Err(StorageError::IndexClosed);
        }
        Ok(self.store.sorted().into_iter().map(|(key, states)| Fact {
            timestamp: key.timestamp,
            dims: key.dims.clone(),
            metrics: states.to_vec(),
        }))
    }

    /// Visit every fact in unspecified order
    pub fn scan(&self, visit: &mut dyn FnMut(&FactView<'_>)) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::IndexClosed);
        }
        let lookup = &self.lookup;
        self.store.for_each(&mut |key, states| {
            visit(&FactView {
                lookup,
                timestamp: key.timestamp,
                dims: &key.dims,
                metrics: states,
            })
        });
        Ok(())
    }

    /// Release all facts; a second close is an error
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::IndexClosed);
        }
        self.store.release();
        self.closed = true;
        tracing::debug!(
            "Closed {} index after {} rows",
            self.index_type,
            self.rows_ingested
        );
        Ok(())
    }
}
