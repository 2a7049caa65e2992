//! Immutable segment file format
//!
//! A segment is one file holding the sorted facts of a persisted index (or
//! of a merge), plus the schema needed to read and merge it.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "SGML"               │
//! │   version: u16                          │
//! │   block_count: u32                      │
//! │   min_timestamp: i64                    │
//! │   max_timestamp: i64                    │
//! │   compression: u8                       │
//! │   fact_count: u64                       │
//! │   metadata_size: u32                    │
//! │   reserved: [u8; 21]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ METADATA                                │
//! │   json: [u8; metadata_size]             │
//! │   metadata_checksum: u32                │
//! ├─────────────────────────────────────────┤
//! │ BLOCKS (variable)                       │
//! │   For each block:                       │
//! │     block_size: u32                     │
//! │     encoded_data: [u8; block_size]      │
//! │     block_checksum: u32                 │
//! ├─────────────────────────────────────────┤
//! │ FOOTER                                  │
//! │   block_meta: [32 bytes; block_count]   │
//! │   footer_size: u32                      │
//! │   footer_checksum: u32                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Writing goes through [`SegmentBuilder`] in a single forward pass; the
//! header is rewritten once all blocks are known. Reading goes through
//! [`SegmentHandle`], which memory-maps the finished file.

use crate::aggregation::AggregatorDef;
use crate::index::IndexSchema;
use crate::storage::compression::{compress_block, decompress_block, ColumnBatch};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Fact, TimeRange};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for segment file identification
const SEGMENT_MAGIC: [u8; 4] = *b"SGML";

/// Current segment format version
const SEGMENT_VERSION: u16 = 1;

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Footer entry size: offset(8) + size(4) + fact_count(4) + min_ts(8) + max_ts(8)
const BLOCK_META_SIZE: usize = 32;

/// File name of the segment inside its output directory
pub const SEGMENT_FILE_NAME: &str = "index.seg";

/// Compression type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::InvalidSegment(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Encoding options for a written segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(default)]
    pub compression: CompressionType,
    /// Facts per block
    #[serde(default = "default_block_rows")]
    pub block_rows: usize,
}

fn default_block_rows() -> usize {
    4096
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            compression: CompressionType::default(),
            block_rows: default_block_rows(),
        }
    }
}

/// Schema and provenance stored in every segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub schema: IndexSchema,
    /// Interval covered by the segment's facts (`None` when empty)
    pub interval: Option<TimeRange>,
    pub index_spec: IndexSpec,
    /// Creation time, Unix milliseconds
    pub created_at: i64,
}

impl SegmentMeta {
    pub fn new(schema: IndexSchema, interval: Option<TimeRange>, index_spec: IndexSpec) -> Self {
        Self {
            schema,
            interval,
            index_spec,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Segment file header
#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub block_count: u32,
    /// Minimum timestamp across all facts
    pub min_timestamp: i64,
    /// Maximum timestamp across all facts
    pub max_timestamp: i64,
    pub compression: CompressionType,
    pub fact_count: u64,
    pub metadata_size: u32,
    pub checksum: u32,
}

impl SegmentHeader {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            block_count: 0,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            compression,
            fact_count: 0,
            metadata_size: 0,
            checksum: 0,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.block_count.to_le_bytes());
        buf[10..18].copy_from_slice(&self.min_timestamp.to_le_bytes());
        buf[18..26].copy_from_slice(&self.max_timestamp.to_le_bytes());
        buf[26] = self.compression as u8;
        buf[27..35].copy_from_slice(&self.fact_count.to_le_bytes());
        buf[35..39].copy_from_slice(&self.metadata_size.to_le_bytes());
        // bytes 39-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8]) -> StorageResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StorageError::InvalidSegment(format!(
                "File too small for header: {} bytes",
                buf.len()
            )));
        }

        let stored_checksum = read_u32(buf, 60)?;
        let computed_checksum = crc32fast::hash(&buf[0..60]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::Corruption(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != SEGMENT_MAGIC {
            return Err(StorageError::InvalidSegment(format!(
                "Invalid magic: {:?}",
                magic
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SEGMENT_VERSION {
            return Err(StorageError::InvalidSegment(format!(
                "Unsupported version: {}",
                version
            )));
        }

        Ok(Self {
            magic,
            version,
            block_count: read_u32(buf, 6)?,
            min_timestamp: read_i64(buf, 10)?,
            max_timestamp: read_i64(buf, 18)?,
            compression: CompressionType::try_from(buf[26])?,
            fact_count: read_u64(buf, 27)?,
            metadata_size: read_u32(buf, 35)?,
            checksum: stored_checksum,
        })
    }
}

fn slice_at(buf: &[u8], at: usize, len: usize) -> StorageResult<&[u8]> {
    buf.get(at..at + len)
        .ok_or_else(|| StorageError::Corruption(format!("Read past end of segment at {}", at)))
}

fn read_u32(buf: &[u8], at: usize) -> StorageResult<u32> {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice_at(buf, at, 4)?);
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(buf: &[u8], at: usize) -> StorageResult<u64> {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(slice_at(buf, at, 8)?);
    Ok(u64::from_le_bytes(bytes))
}

fn read_i64(buf: &[u8], at: usize) -> StorageResult<i64> {
    read_u64(buf, at).map(|v| v as i64)
}

/// Metadata for a single block within a segment
#[derive(Debug, Clone)]
pub struct BlockMeta {
    /// Offset of the block's size prefix from start of file
    pub offset: u64,
    /// Size of encoded data
    pub size: u32,
    pub fact_count: u32,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
}

impl BlockMeta {
    /// Check if block overlaps with time range
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.min_timestamp < range.end && self.max_timestamp >= range.start
    }

    fn to_bytes(&self) -> [u8; BLOCK_META_SIZE] {
        let mut buf = [0u8; BLOCK_META_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.fact_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.min_timestamp.to_le_bytes());
        buf[24..32].copy_from_slice(&self.max_timestamp.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> StorageResult<Self> {
        Ok(Self {
            offset: read_u64(buf, 0)?,
            size: read_u32(buf, 8)?,
            fact_count: read_u32(buf, 12)?,
            min_timestamp: read_i64(buf, 16)?,
            max_timestamp: read_i64(buf, 24)?,
        })
    }
}

/// Streaming writer for one segment file
///
/// Facts must be pushed in segment order.
pub struct SegmentBuilder {
    path: PathBuf,
    file: BufWriter<File>,
    header: SegmentHeader,
    blocks: Vec<BlockMeta>,
    buffer: Vec<Fact>,
    block_rows: usize,
    offset: u64,
}

impl SegmentBuilder {
    /// Create the segment file and write its metadata
    pub fn create(path: impl AsRef<Path>, meta: &SegmentMeta) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = BufWriter::new(File::create(&path)?);
        let mut header = SegmentHeader::new(meta.index_spec.compression);

        let metadata = serde_json::to_vec(meta)?;
        header.metadata_size = metadata.len() as u32;

        // Placeholder header, rewritten in `finish`
        file.write_all(&header.to_bytes())?;
        file.write_all(&metadata)?;
        file.write_all(&crc32fast::hash(&metadata).to_le_bytes())?;

        let offset = (HEADER_SIZE + metadata.len() + 4) as u64;

        Ok(Self {
            path,
            file,
            header,
            blocks: Vec::new(),
            buffer: Vec::with_capacity(meta.index_spec.block_rows.max(1)),
            block_rows: meta.index_spec.block_rows.max(1),
            offset,
        })
    }

    /// Add one fact, flushing a block when the buffer is full
    pub fn push(&mut self, fact: Fact) -> StorageResult<()> {
        self.buffer.push(fact);
        if self.buffer.len() >= self.block_rows {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> StorageResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let encoded = compress_block(&self.buffer, self.header.compression)?;

        let (min_ts, max_ts) = self
            .buffer
            .iter()
            .fold((i64::MAX, i64::MIN), |(min, max), f| {
                (min.min(f.timestamp), max.max(f.timestamp))
            });

        // Block: size (4) + data (N) + checksum (4)
        let checksum = crc32fast::hash(&encoded);
        self.file.write_all(&(encoded.len() as u32).to_le_bytes())?;
        self.file.write_all(&encoded)?;
        self.file.write_all(&checksum.to_le_bytes())?;

        self.blocks.push(BlockMeta {
            offset: self.offset,
            size: encoded.len() as u32,
            fact_count: self.buffer.len() as u32,
            min_timestamp: min_ts,
            max_timestamp: max_ts,
        });

        self.offset += encoded.len() as u64 + 8;
        self.header.block_count += 1;
        self.header.fact_count += self.buffer.len() as u64;
        self.header.min_timestamp = self.header.min_timestamp.min(min_ts);
        self.header.max_timestamp = self.header.max_timestamp.max(max_ts);
        self.buffer.clear();

        Ok(())
    }

    /// Flush remaining facts, write the footer and open the finished segment
    pub fn finish(mut self) -> StorageResult<SegmentHandle> {
        self.flush_block()?;

        let mut footer = Vec::with_capacity(self.blocks.len() * BLOCK_META_SIZE);
        for block in &self.blocks {
            footer.extend_from_slice(&block.to_bytes());
        }
        self.file.write_all(&footer)?;
        self.file.write_all(&(footer.len() as u32).to_le_bytes())?;
        self.file.write_all(&crc32fast::hash(&footer).to_le_bytes())?;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.flush()?;

        tracing::debug!(
            "Wrote segment {:?}: {} facts in {} blocks",
            self.path,
            self.header.fact_count,
            self.header.block_count
        );

        SegmentHandle::open(&self.path)
    }
}

/// Read-only handle to a finished segment
///
/// The file is memory-mapped; blocks are decoded on demand.
pub struct SegmentHandle {
    path: PathBuf,
    header: SegmentHeader,
    meta: SegmentMeta,
    blocks: Vec<BlockMeta>,
    data: Mmap,
}

impl std::fmt::Debug for SegmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("path", &self.path)
            .field("fact_count", &self.header.fact_count)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl SegmentHandle {
    /// Open an existing segment file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // SAFETY: segments are immutable once written and the owning run
        // only deletes them after every handle has been dropped.
        let data = unsafe { Mmap::map(&file)? };

        let header = SegmentHeader::from_bytes(&data)?;

        let meta_start = HEADER_SIZE;
        let meta_len = header.metadata_size as usize;
        let metadata = slice_at(&data, meta_start, meta_len)?;
        let stored = read_u32(&data, meta_start + meta_len)?;
        if crc32fast::hash(metadata) != stored {
            return Err(StorageError::Corruption("Metadata checksum mismatch".into()));
        }
        let meta: SegmentMeta = serde_json::from_slice(metadata)?;

        let blocks = Self::read_footer(&data, &header)?;

        Ok(Self {
            path,
            header,
            meta,
            blocks,
            data,
        })
    }

    /// Parse the block table at the end of the file
    fn read_footer(data: &[u8], header: &SegmentHeader) -> StorageResult<Vec<BlockMeta>> {
        if data.len() < HEADER_SIZE + 8 {
            return Err(StorageError::InvalidSegment("Missing footer".into()));
        }

        let trailer = data.len() - 8;
        let footer_size = read_u32(data, trailer)? as usize;
        let stored_checksum = read_u32(data, trailer + 4)?;

        let footer_start = trailer
            .checked_sub(footer_size)
            .ok_or_else(|| StorageError::Corruption("Footer size exceeds file".into()))?;
        let footer = &data[footer_start..trailer];

        if crc32fast::hash(footer) != stored_checksum {
            return Err(StorageError::Corruption("Footer checksum mismatch".into()));
        }

        if footer_size != header.block_count as usize * BLOCK_META_SIZE {
            return Err(StorageError::Corruption(format!(
                "Footer holds {} bytes for {} blocks",
                footer_size, header.block_count
            )));
        }

        footer
            .chunks_exact(BLOCK_META_SIZE)
            .map(BlockMeta::from_bytes)
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.meta.schema
    }

    pub fn aggregators(&self) -> &[AggregatorDef] {
        &self.meta.schema.aggregators
    }

    pub fn interval(&self) -> Option<TimeRange> {
        self.meta.interval
    }

    pub fn fact_count(&self) -> u64 {
        self.header.fact_count
    }

    pub fn blocks(&self) -> &[BlockMeta] {
        &self.blocks
    }

    /// Size of the segment file in bytes
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Decode a block by index
    pub fn read_block(&self, block_idx: usize) -> StorageResult<ColumnBatch> {
        let meta = self.blocks.get(block_idx).ok_or_else(|| {
            StorageError::InvalidSegment(format!("Block index {} out of range", block_idx))
        })?;

        let offset = meta.offset as usize;
        let size = read_u32(&self.data, offset)? as usize;
        if size != meta.size as usize {
            return Err(StorageError::Corruption(format!(
                "Block size mismatch: footer={}, block={}",
                meta.size, size
            )));
        }

        let encoded = slice_at(&self.data, offset + 4, size)?;
        let stored_checksum = read_u32(&self.data, offset + 4 + size)?;
        if crc32fast::hash(encoded) != stored_checksum {
            return Err(StorageError::Corruption(format!(
                "Block {} checksum mismatch",
                block_idx
            )));
        }

        decompress_block(encoded, self.header.compression)
    }

    /// Iterate over facts in segment order
    pub fn facts(&self) -> FactCursor<'_> {
        FactCursor {
            segment: self,
            block_idx: 0,
            batch: None,
            row: 0,
        }
    }

    /// Read all facts into memory
    pub fn read_all(&self) -> StorageResult<Vec<Fact>> {
        self.facts().collect()
    }
}

/// Block-at-a-time cursor over a segment's facts
pub struct FactCursor<'a> {
    segment: &'a SegmentHandle,
    block_idx: usize,
    batch: Option<ColumnBatch>,
    row: usize,
}

impl Iterator for FactCursor<'_> {
    type Item = StorageResult<Fact>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.batch {
                if self.row < batch.len() {
                    let fact = batch.fact(self.row);
                    self.row += 1;
                    return Some(Ok(fact));
                }
            }

            if self.block_idx >= self.segment.blocks.len() {
                return None;
            }

            match self.segment.read_block(self.block_idx) {
                Ok(batch) => {
                    self.batch = Some(batch);
                    self.row = 0;
                    self.block_idx += 1;
                }
                Err(e) => {
                    self.block_idx = self.segment.blocks.len();
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggState;
    use crate::storage::DimValue;
    use tempfile::tempdir;

    fn schema() -> IndexSchema {
        IndexSchema::new(vec!["country".into()], vec![AggregatorDef::count("rows")])
    }

    fn facts(count: i64) -> Vec<Fact> {
        (0..count)
            .map(|i| Fact {
                timestamp: 1000 + i,
                dims: vec![DimValue::from(format!("c{}", i % 3))],
                metrics: vec![AggState::Count(i as u64 + 1)],
            })
            .collect()
    }

    fn write(path: &Path, facts: &[Fact], spec: IndexSpec) -> SegmentHandle {
        let interval = facts
            .first()
            .zip(facts.last())
            .map(|(a, b)| TimeRange::covering(a.timestamp, b.timestamp));
        let meta = SegmentMeta::new(schema(), interval, spec);
        let mut builder = SegmentBuilder::create(path, &meta).unwrap();
        for fact in facts {
            builder.push(fact.clone()).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = SegmentHeader::new(CompressionType::Lz4);
        header.block_count = 10;
        header.min_timestamp = 1000;
        header.max_timestamp = 2000;
        header.fact_count = 99;
        header.metadata_size = 321;

        let parsed = SegmentHeader::from_bytes(&header.to_bytes()).unwrap();

        assert_eq!(parsed.magic, SEGMENT_MAGIC);
        assert_eq!(parsed.block_count, 10);
        assert_eq!(parsed.fact_count, 99);
        assert_eq!(parsed.metadata_size, 321);
        assert_eq!(parsed.compression, CompressionType::Lz4);
    }

    #[test]
    fn test_header_checksum_validation() {
        let header = SegmentHeader::new(CompressionType::Lz4);
        let mut bytes = header.to_bytes();
        bytes[10] ^= 0xFF;

        assert!(matches!(
            SegmentHeader::from_bytes(&bytes),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_write_and_read_across_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SEGMENT_FILE_NAME);
        let spec = IndexSpec {
            compression: CompressionType::Lz4,
            block_rows: 4,
        };
        let input = facts(10);

        let handle = write(&path, &input, spec);

        assert_eq!(handle.fact_count(), 10);
        assert_eq!(handle.blocks().len(), 3);
        assert_eq!(handle.interval(), Some(TimeRange::new(1000, 1010)));
        assert_eq!(handle.schema(), &schema());
        assert_eq!(handle.read_all().unwrap(), input);

        let reopened = SegmentHandle::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), input);
    }

    #[test]
    fn test_empty_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SEGMENT_FILE_NAME);
        let handle = write(&path, &[], IndexSpec::default());

        assert_eq!(handle.fact_count(), 0);
        assert!(handle.interval().is_none());
        assert!(handle.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_uncompressed_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SEGMENT_FILE_NAME);
        let spec = IndexSpec {
            compression: CompressionType::None,
            block_rows: 100,
        };
        let handle = write(&path, &facts(25), spec);
        assert_eq!(handle.read_all().unwrap(), facts(25));
    }

    #[test]
    fn test_block_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SEGMENT_FILE_NAME);
        let handle = write(&path, &facts(10), IndexSpec::default());
        let offset = handle.blocks()[0].offset as usize + 6;
        drop(handle);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[offset] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let handle = SegmentHandle::open(&path).unwrap();
        assert!(matches!(handle.read_block(0), Err(StorageError::Corruption(_))));
    }

    #[test]
    fn test_not_a_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.seg");
        std::fs::write(&path, b"definitely not a segment").unwrap();
        assert!(SegmentHandle::open(&path).is_err());
    }
}
