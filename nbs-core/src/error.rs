//! Error types for the NBS chunk store

use crate::addr::Address;
use thiserror::Error;

/// Result type alias for chunk store operations
pub type Result<T> = std::result::Result<T, NbsError>;

/// Chunk store error types
#[derive(Error, Debug)]
pub enum NbsError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Table or record corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// A table writer was asked to grow past the capacity it was sized for
    #[error("Table overflow: need {needed} bytes, writer capacity is {capacity}")]
    TableOverflow { needed: usize, capacity: usize },

    /// The same address was written twice to one table writer
    #[error("Duplicate chunk in table writer: {0}")]
    DuplicateChunk(Address),

    /// Memory table capacity must be positive
    #[error("Invalid memory table capacity: {0}")]
    InvalidCapacity(usize),

    /// A chunk can never fit in a memory table of the configured capacity
    #[error("Chunk of {size} bytes exceeds memory table capacity {capacity}")]
    ChunkTooLarge { size: usize, capacity: usize },

    /// Manifest read/write error
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NbsError {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            NbsError::Corruption(_)
                | NbsError::ChecksumMismatch { .. }
                | NbsError::InvalidFormat(_)
                | NbsError::Compression(_)
        )
    }

    /// Check if error is a caller bug rather than a data or IO problem
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            NbsError::TableOverflow { .. } | NbsError::DuplicateChunk(_)
        )
    }
}

impl From<serde_json::Error> for NbsError {
    fn from(e: serde_json::Error) -> Self {
        NbsError::Manifest(e.to_string())
    }
}
