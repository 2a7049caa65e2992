//! Block codec for segment files
//!
//! A block holds a run of consecutive facts in columnar form.
//!
//! Strategy:
//! 1. Delta-encode timestamps (facts arrive sorted, so deltas are small)
//! 2. Dictionary-encode every dimension column (one dictionary per block)
//! 3. Store aggregator states column by column
//! 4. Serialize with bincode
//! 5. LZ4 compress the result (unless the segment asked for no compression)
//!
//! Decoding yields a [`ColumnBatch`], which the vectorized query path
//! evaluates filters against without materializing facts.

use crate::aggregation::AggState;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::segment::CompressionType;
use crate::storage::types::{DimValue, Fact};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dictionary-encoded dimension column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictColumn {
    /// Distinct values in first-seen order
    pub dictionary: Vec<DimValue>,
    /// Per row index into `dictionary`
    pub ids: Vec<u32>,
}

impl DictColumn {
    fn new() -> Self {
        Self {
            dictionary: Vec::new(),
            ids: Vec::new(),
        }
    }

    pub fn value(&self, row: usize) -> Option<&DimValue> {
        self.ids
            .get(row)
            .and_then(|id| self.dictionary.get(*id as usize))
    }
}

/// Decoded block in columnar form
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBatch {
    pub timestamps: Vec<i64>,
    /// One column per schema dimension
    pub dimensions: Vec<DictColumn>,
    /// One column per aggregator
    pub metrics: Vec<Vec<AggState>>,
}

impl ColumnBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Materialize one row as a fact
    pub fn fact(&self, row: usize) -> Fact {
        Fact {
            timestamp: self.timestamps[row],
            dims: self
                .dimensions
                .iter()
                .map(|col| col.value(row).cloned().unwrap_or(DimValue::Null))
                .collect(),
            metrics: self.metrics.iter().map(|col| col[row].clone()).collect(),
        }
    }

    pub fn into_facts(self) -> Vec<Fact> {
        (0..self.len()).map(|row| self.fact(row)).collect()
    }
}

/// On-disk form of a block
#[derive(Debug, Serialize, Deserialize)]
struct EncodedBlock {
    /// Timestamp of the first fact
    base_timestamp: i64,
    /// Differences from the previous timestamp
    timestamp_deltas: Vec<i64>,
    dimensions: Vec<DictColumn>,
    metrics: Vec<Vec<AggState>>,
}

/// Encode a block of facts
///
/// # Arguments
/// * `facts` - Facts in segment order (not re-sorted)
/// * `compression` - Whether to LZ4 the serialized block
///
/// # Returns
/// Bytes ready for storage
pub fn compress_block(facts: &[Fact], compression: CompressionType) -> StorageResult<Vec<u8>> {
    if facts.is_empty() {
        return Ok(Vec::new());
    }

    let base_timestamp = facts[0].timestamp;
    let mut timestamp_deltas = Vec::with_capacity(facts.len());
    let mut prev_ts = base_timestamp;
    for fact in facts {
        timestamp_deltas.push(fact.timestamp.wrapping_sub(prev_ts));
        prev_ts = fact.timestamp;
    }

    let dim_count = facts[0].dims.len();
    let mut dimensions = Vec::with_capacity(dim_count);
    for col in 0..dim_count {
        let mut column = DictColumn::new();
        let mut interned: HashMap<&DimValue, u32> = HashMap::new();
        for fact in facts {
            let value = fact.dims.get(col).ok_or_else(|| {
                StorageError::Serialization("fact has fewer dimensions than its block".into())
            })?;
            let id = *interned.entry(value).or_insert_with(|| {
                column.dictionary.push(value.clone());
                (column.dictionary.len() - 1) as u32
            });
            column.ids.push(id);
        }
        dimensions.push(column);
    }

    let metric_count = facts[0].metrics.len();
    let mut metrics = vec![Vec::with_capacity(facts.len()); metric_count];
    for fact in facts {
        if fact.metrics.len() != metric_count {
            return Err(StorageError::Serialization(
                "fact has a different number of metrics than its block".into(),
            ));
        }
        for (column, state) in metrics.iter_mut().zip(&fact.metrics) {
            column.push(state.clone());
        }
    }

    let block = EncodedBlock {
        base_timestamp,
        timestamp_deltas,
        dimensions,
        metrics,
    };

    let serialized = bincode::serialize(&block)?;

    Ok(match compression {
        CompressionType::Lz4 => lz4_flex::compress_prepend_size(&serialized),
        CompressionType::None => serialized,
    })
}

/// Decode a block produced by [`compress_block`]
pub fn decompress_block(data: &[u8], compression: CompressionType) -> StorageResult<ColumnBatch> {
    if data.is_empty() {
        return Ok(ColumnBatch {
            timestamps: Vec::new(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
        });
    }

    let decompressed;
    let raw = match compression {
        CompressionType::Lz4 => {
            decompressed = lz4_flex::decompress_size_prepended(data).map_err(|e| {
                StorageError::Compression(format!("LZ4 decompression failed: {}", e))
            })?;
            &decompressed[..]
        }
        CompressionType::None => data,
    };

    let block: EncodedBlock = bincode::deserialize(raw)?;
    let len = block.timestamp_deltas.len();

    let valid_dims = block.dimensions.iter().all(|col| {
        col.ids.len() == len && col.ids.iter().all(|id| (*id as usize) < col.dictionary.len())
    });
    if !valid_dims || block.metrics.iter().any(|col| col.len() != len) {
        return Err(StorageError::Corruption(
            "block columns disagree on row count".into(),
        ));
    }

    let mut timestamps = Vec::with_capacity(len);
    let mut current = block.base_timestamp;
    for delta in block.timestamp_deltas {
        current = current.wrapping_add(delta);
        timestamps.push(current);
    }

    Ok(ColumnBatch {
        timestamps,
        dimensions: block.dimensions,
        metrics: block.metrics,
    })
}

/// Size statistics for an encoded block
#[derive(Debug)]
pub struct CompressionStats {
    pub fact_count: usize,
    /// Uncompressed bincode size of the facts (bytes)
    pub original_size: usize,
    pub compressed_size: usize,
    /// Compression ratio (original / compressed)
    pub ratio: f64,
}

/// Calculate compression statistics
pub fn compression_stats(facts: &[Fact], compressed: &[u8]) -> CompressionStats {
    let original_size = bincode::serialized_size(facts).unwrap_or(0) as usize;
    let compressed_size = compressed.len();
    let ratio = if compressed_size > 0 {
        original_size as f64 / compressed_size as f64
    } else {
        0.0
    };

    CompressionStats {
        fact_count: facts.len(),
        original_size,
        compressed_size,
        ratio,
    }
}
