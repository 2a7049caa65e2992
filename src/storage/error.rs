//! Storage error types
//!
//! Defines all errors that can occur while building, persisting, loading and
//! merging segments.

use crate::aggregation::AggregationError;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Segment file format error
    #[error("Invalid segment format: {0}")]
    InvalidSegment(String),

    /// A new fact would push the mutable index past its capacity
    #[error("Index capacity exceeded: at most {max_row_count} facts")]
    CapacityExceeded { max_row_count: usize },

    /// The mutable index was used after close
    #[error("Index is closed")]
    IndexClosed,

    /// Merge inputs disagree with the requested schema
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// Aggregator evaluation failed
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::CapacityExceeded { max_row_count: 10 };
        assert_eq!(err.to_string(), "Index capacity exceeded: at most 10 facts");

        let err = StorageError::ConfigurationMismatch("aggregators differ".to_string());
        assert_eq!(err.to_string(), "Configuration mismatch: aggregators differ");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }

    #[test]
    fn test_aggregation_error_conversion() {
        let err: StorageError = AggregationError::IncompatibleStates {
            left: "count".into(),
            right: "min".into(),
        }
        .into();
        assert!(matches!(err, StorageError::Aggregation(_)));
    }
}
