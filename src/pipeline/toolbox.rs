//! Process-wide segment tooling
//!
//! The writer, reader, merger and index spec are built once at start-up and
//! shared by every run. Tests build private toolboxes instead of installing
//! one.

use crate::storage::{
    IndexIo, IndexMerger, IndexSpec, SegmentMerger, SegmentReader, SegmentWriter, StorageError,
    StorageResult,
};
use once_cell::sync::OnceCell;

static TOOLBOX: OnceCell<Toolbox> = OnceCell::new();

/// Segment capabilities a pipeline run borrows
pub struct Toolbox {
    writer: Box<dyn SegmentWriter>,
    reader: Box<dyn SegmentReader>,
    merger: Box<dyn SegmentMerger>,
    index_spec: IndexSpec,
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("index_spec", &self.index_spec)
            .finish_non_exhaustive()
    }
}

impl Default for Toolbox {
    fn default() -> Self {
        Self::new(IndexSpec::default())
    }
}

impl Toolbox {
    /// Toolbox backed by the built-in segment format
    pub fn new(index_spec: IndexSpec) -> Self {
        Self {
            writer: Box::new(IndexIo),
            reader: Box::new(IndexIo),
            merger: Box::new(IndexMerger::new()),
            index_spec,
        }
    }

    pub fn with_writer(mut self, writer: impl SegmentWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn with_reader(mut self, reader: impl SegmentReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn with_merger(mut self, merger: impl SegmentMerger + 'static) -> Self {
        self.merger = Box::new(merger);
        self
    }

    pub fn writer(&self) -> &dyn SegmentWriter {
        self.writer.as_ref()
    }

    pub fn reader(&self) -> &dyn SegmentReader {
        self.reader.as_ref()
    }

    pub fn merger(&self) -> &dyn SegmentMerger {
        self.merger.as_ref()
    }

    pub fn index_spec(&self) -> &IndexSpec {
        &self.index_spec
    }

    /// Install as the process-wide toolbox; fails if one is already installed
    pub fn install(self) -> StorageResult<&'static Toolbox> {
        TOOLBOX
            .set(self)
            .map_err(|_| StorageError::Config("Toolbox already installed".into()))?;
        Self::global()
    }

    /// The installed toolbox
    pub fn global() -> StorageResult<&'static Toolbox> {
        TOOLBOX
            .get()
            .ok_or_else(|| StorageError::Config("Toolbox not installed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CompressionType;

    // The only test touching the global cell
    #[test]
    fn test_install_once() {
        let spec = IndexSpec {
            compression: CompressionType::None,
            block_rows: 128,
        };
        let installed = Toolbox::new(spec).install().unwrap();
        assert_eq!(installed.index_spec().block_rows, 128);
        assert_eq!(Toolbox::global().unwrap().index_spec().compression, CompressionType::None);

        let err = Toolbox::default().install().unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert_eq!(Toolbox::global().unwrap().index_spec().block_rows, 128);
    }
}
