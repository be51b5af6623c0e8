//! Table files
//!
//! A table is an immutable, self-describing blob of chunks:
//! - Chunk records, optionally LZ4 compressed, each with a CRC32
//! - An index of (address, offset, length) sorted by address
//! - A footer carrying the chunk count, a checksum over the index and a magic
//!
//! Tables are produced once by a [`TableWriter`] and never modified; a
//! [`TableReader`] only ever opens a complete, finished table.

mod format;
mod persist;
mod reader;
mod source;
mod writer;

pub use format::{
    max_table_size, Footer, IndexEntry, RecordKind, CHECKSUM_SIZE, FOOTER_SIZE,
    INDEX_ENTRY_SIZE, RECORD_OVERHEAD, TABLE_MAGIC,
};
pub use persist::{open_table_file, table_file_path, write_table_file};
pub(crate) use persist::write_atomic;
pub use reader::TableReader;
pub use source::{read_exact_at, FileSource, ReadAt};
pub use writer::TableWriter;

use crate::addr::Address;
use crate::Result;
use bytes::Bytes;

/// Table configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// Compress chunk records with LZ4 when it makes them smaller
    pub compression: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { compression: true }
    }
}

/// The output of a finished [`TableWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTable {
    /// Address of the serialized index
    pub name: Address,
    /// The complete table bytes
    pub data: Bytes,
    /// Number of chunks in the table
    pub chunk_count: u32,
    /// Sum of the uncompressed chunk payloads
    pub payload_bytes: u64,
}

impl FinishedTable {
    /// Bytes written by the writer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    /// Open an in-memory reader over the table
    pub fn reader(&self) -> Result<TableReader<Bytes>> {
        TableReader::from_bytes(self.data.clone())
    }
}
