//! K-way merge of immutable segments
//!
//! Every input segment is already sorted by (timestamp, dimension tuple).
//! A min-heap holds the head fact of each input; popping yields the global
//! order. With rollup, consecutive facts sharing a key are combined state by
//! state, which gives the same facts as replaying every original row through
//! one index. Without rollup facts are copied through, ties ordered by input
//! position so arrival order survives.

use crate::aggregation::AggregatorDef;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::{
    FactCursor, IndexSpec, SegmentBuilder, SegmentHandle, SegmentMeta, SEGMENT_FILE_NAME,
};
use crate::storage::types::{DimValue, Fact};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;
use std::time::Instant;

struct HeapEntry {
    fact: Fact,
    source_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    // Reversed so the max-heap pops the smallest key first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fact
            .key_cmp(&self.fact)
            .then_with(|| other.source_idx.cmp(&self.source_idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorted fact stream of one input, checking the order it promises
struct SourceCursor<'a> {
    source_idx: usize,
    facts: FactCursor<'a>,
    last_key: Option<(i64, Vec<DimValue>)>,
}

impl<'a> SourceCursor<'a> {
    fn new(source_idx: usize, segment: &'a SegmentHandle) -> Self {
        Self {
            source_idx,
            facts: segment.facts(),
            last_key: None,
        }
    }

    fn next(&mut self) -> StorageResult<Option<HeapEntry>> {
        let fact = match self.facts.next() {
            None => return Ok(None),
            Some(fact) => fact?,
        };

        if let Some((ts, dims)) = &self.last_key {
            let order = ts.cmp(&fact.timestamp).then_with(|| dims.cmp(&fact.dims));
            if order == Ordering::Greater {
                return Err(StorageError::InvalidSegment(format!(
                    "Merge input {} is not sorted at timestamp {}",
                    self.source_idx, fact.timestamp
                )));
            }
        }
        self.last_key = Some((fact.timestamp, fact.dims.clone()));

        Ok(Some(HeapEntry {
            fact,
            source_idx: self.source_idx,
        }))
    }
}

/// Merges persisted segments into one
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexMerger;

impl IndexMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `segments` into a new segment under `output_dir`
    ///
    /// Inputs must share dimensions, granularity and exactly `aggregators`;
    /// any difference fails before anything is written.
    pub fn merge(
        &self,
        segments: &[SegmentHandle],
        rollup: bool,
        aggregators: &[AggregatorDef],
        output_dir: &Path,
        spec: &IndexSpec,
    ) -> StorageResult<SegmentHandle> {
        let start = Instant::now();

        let first = segments
            .first()
            .ok_or_else(|| StorageError::Config("No segments to merge".into()))?;

        let mut schema = first.schema().clone();
        schema.aggregators = aggregators.to_vec();
        schema.rollup = rollup;
        for (i, segment) in segments.iter().enumerate() {
            schema.check_compatible(
                segment.schema(),
                &format!("segment {} ({})", i, segment.path().display()),
            )?;
        }

        let interval = segments
            .iter()
            .filter_map(|s| s.interval())
            .reduce(|a, b| a.union(&b));

        std::fs::create_dir_all(output_dir)?;
        let meta = SegmentMeta::new(schema, interval, *spec);
        let mut builder = SegmentBuilder::create(output_dir.join(SEGMENT_FILE_NAME), &meta)?;

        let mut cursors: Vec<SourceCursor<'_>> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| SourceCursor::new(i, s))
            .collect();

        let mut heap = BinaryHeap::with_capacity(cursors.len());
        for cursor in cursors.iter_mut() {
            if let Some(entry) = cursor.next()? {
                heap.push(entry);
            }
        }

        let mut pending: Option<Fact> = None;
        let mut facts_in = 0u64;
        let mut facts_out = 0u64;

        while let Some(HeapEntry { fact, source_idx }) = heap.pop() {
            if let Some(entry) = cursors[source_idx].next()? {
                heap.push(entry);
            }
            facts_in += 1;

            if !rollup {
                builder.push(fact)?;
                facts_out += 1;
                continue;
            }

            match pending.as_mut() {
                Some(current) if current.key_cmp(&fact) == Ordering::Equal => {
                    for (state, other) in current.metrics.iter_mut().zip(&fact.metrics) {
                        state.combine(other)?;
                    }
                }
                _ => {
                    if let Some(done) = pending.replace(fact) {
                        builder.push(done)?;
                        facts_out += 1;
                    }
                }
            }
        }

        if let Some(done) = pending {
            builder.push(done)?;
            facts_out += 1;
        }

        let handle = builder.finish()?;

        tracing::info!(
            "Merged {} segments: {} facts in, {} facts out, {} bytes in {:?}",
            segments.len(),
            facts_in,
            facts_out,
            handle.size_bytes(),
            start.elapsed()
        );

        Ok(handle)
    }
}
