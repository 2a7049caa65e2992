//! Capability interfaces for persisting, loading and merging segments
//!
//! The pipeline only talks to these traits, so tests can swap in writers
//! that fail on demand.

use crate::aggregation::AggregatorDef;
use crate::index::IncrementalIndex;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::merge::IndexMerger;
use crate::storage::segment::{
    IndexSpec, SegmentBuilder, SegmentHandle, SegmentMeta, SEGMENT_FILE_NAME,
};
use std::path::Path;

/// Serializes a mutable index into an immutable segment
pub trait SegmentWriter: Send + Sync {
    fn persist(
        &self,
        index: &IncrementalIndex,
        output_dir: &Path,
        spec: &IndexSpec,
    ) -> StorageResult<SegmentHandle>;
}

/// Opens a persisted segment
pub trait SegmentReader: Send + Sync {
    fn load(&self, path: &Path) -> StorageResult<SegmentHandle>;
}

/// Consolidates several segments into one
pub trait SegmentMerger: Send + Sync {
    fn merge(
        &self,
        segments: &[SegmentHandle],
        rollup: bool,
        aggregators: &[AggregatorDef],
        output_dir: &Path,
        spec: &IndexSpec,
    ) -> StorageResult<SegmentHandle>;
}

/// Default segment writer and reader
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexIo;

impl SegmentWriter for IndexIo {
    fn persist(
        &self,
        index: &IncrementalIndex,
        output_dir: &Path,
        spec: &IndexSpec,
    ) -> StorageResult<SegmentHandle> {
        if index.is_closed() {
            return Err(StorageError::IndexClosed);
        }

        std::fs::create_dir_all(output_dir)?;
        let meta = SegmentMeta::new(index.schema().as_ref().clone(), index.interval(), *spec);
        let mut builder = SegmentBuilder::create(output_dir.join(SEGMENT_FILE_NAME), &meta)?;
        for fact in index.sorted_facts()? {
            builder.push(fact)?;
        }
        builder.finish()
    }
}

impl SegmentReader for IndexIo {
    /// Accepts either the segment file or the directory holding it
    fn load(&self, path: &Path) -> StorageResult<SegmentHandle> {
        if path.is_dir() {
            SegmentHandle::open(path.join(SEGMENT_FILE_NAME))
        } else {
            SegmentHandle::open(path)
        }
    }
}

impl SegmentMerger for IndexMerger {
    fn merge(
        &self,
        segments: &[SegmentHandle],
        rollup: bool,
        aggregators: &[AggregatorDef],
        output_dir: &Path,
        spec: &IndexSpec,
    ) -> StorageResult<SegmentHandle> {
        IndexMerger::merge(self, segments, rollup, aggregators, output_dir, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexSchema, IndexType};
    use crate::storage::{Fact, Row};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn index() -> IncrementalIndex {
        let schema = Arc::new(IndexSchema::new(
            vec!["page".into()],
            vec![AggregatorDef::count("rows")],
        ));
        let mut index = IncrementalIndex::new(schema, IndexType::Sorted, 100).unwrap();
        for i in 0..20 {
            index
                .append(&Row::new(i % 4).dim("page", format!("p{}", i % 5)))
                .unwrap();
        }
        index
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempdir().unwrap();
        let index = index();
        let expected: Vec<Fact> = index.sorted_facts().unwrap().collect();

        let handle = IndexIo
            .persist(&index, &dir.path().join("seg"), &IndexSpec::default())
            .unwrap();
        assert!(handle.path().exists());
        assert_eq!(handle.fact_count() as usize, index.size());
        assert_eq!(handle.interval(), index.interval());

        let loaded = IndexIo.load(&dir.path().join("seg")).unwrap();
        assert_eq!(loaded.read_all().unwrap(), expected);
        assert_eq!(loaded.schema(), index.schema().as_ref());
    }

    #[test]
    fn test_persist_closed_index_fails() {
        let dir = tempdir().unwrap();
        let mut index = index();
        index.close().unwrap();

        let err = IndexIo
            .persist(&index, dir.path(), &IndexSpec::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::IndexClosed));
    }

    #[test]
    fn test_load_missing_segment() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            IndexIo.load(&dir.path().join("nope")),
            Err(StorageError::Io(_))
        ));
    }
}
