//! NBS Core - Content-Addressed Chunk Storage
//!
//! Chunks are immutable byte strings named by the hash of their contents.
//! New chunks are buffered in memory and written out as immutable, sorted,
//! self-verifying table files.
//!
//! # Architecture
//!
//! - **Addressing**: 20-byte SHA-512 prefix of the chunk bytes
//! - **MemTable**: Bounded in-memory buffer that deduplicates on flush
//! - **Tables**: Immutable files of checksummed records plus a sorted index
//! - **Reader groups**: Several sources queried as one, newest first
//! - **BlockStore**: A directory of tables tracked by a manifest

pub mod addr;
pub mod chunk_source;
pub mod memtable;
pub mod reader_group;
pub mod store;
pub mod table;

mod error;

pub use addr::{compute_addr, Address, Chunk, ADDR_SIZE};
pub use chunk_source::{ChunkReader, GetBatch, GetRecord, HasBatch, HasRecord};
pub use error::{NbsError, Result};
pub use memtable::{FlushStats, MemTable};
pub use reader_group::ChunkReaderGroup;
pub use store::{BlockStore, StoreConfig, StoreStats};
pub use table::{FinishedTable, TableConfig, TableReader, TableWriter};

/// NBS version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// MemTable byte budget before a flush (64MB)
    pub const MEMTABLE_CAPACITY: usize = 64 * 1024 * 1024;

    /// File extension of table files
    pub const TABLE_EXTENSION: &str = "nbs";

    /// Name of the store manifest inside the store directory
    pub const MANIFEST_FILE: &str = "manifest.json";
}
