//! MemTable: the bounded in-memory write buffer
//!
//! New chunks accumulate in a MemTable until its byte budget is spent or the
//! caller flushes it. A flush deduplicates the buffered chunks against the
//! tables that already exist and writes the rest into a new table.

use crate::addr::{Address, Chunk};
use crate::chunk_source::{ChunkReader, GetBatch, HasBatch};
use crate::table::{max_table_size, FinishedTable, TableConfig, TableWriter};
use crate::{NbsError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// MemTable for buffering new chunks
pub struct MemTable {
    inner: RwLock<MemTableInner>,
    capacity: usize,
}

#[derive(Default)]
struct MemTableInner {
    chunks: HashMap<Address, Bytes>,
    /// Insertion order, used as the write-out order
    order: Vec<Address>,
    used_bytes: usize,
}

/// Outcome of writing a MemTable into a table writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Chunks handed to the writer
    pub written: usize,
    /// Chunks skipped because an existing source already held them
    pub skipped: usize,
    /// Payload bytes handed to the writer
    pub written_bytes: usize,
}

impl MemTable {
    /// Create an empty MemTable with a budget of `capacity` payload bytes
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(NbsError::InvalidCapacity(capacity));
        }
        Ok(Self {
            inner: RwLock::new(MemTableInner::default()),
            capacity,
        })
    }

    /// Buffer a chunk.
    ///
    /// Returns `false` and leaves the table untouched if the payload does not
    /// fit in the remaining budget. Re-adding a buffered address succeeds
    /// without counting its bytes again.
    pub fn add_chunk(&self, addr: Address, data: &[u8]) -> bool {
        self.insert(addr, data.len(), || Bytes::copy_from_slice(data))
    }

    /// Buffer a [`Chunk`], sharing its bytes instead of copying them.
    ///
    /// Same budget rules as [`MemTable::add_chunk`].
    pub fn add(&self, chunk: &Chunk) -> bool {
        self.insert(chunk.addr(), chunk.len(), || chunk.data().clone())
    }

    fn insert(&self, addr: Address, len: usize, data: impl FnOnce() -> Bytes) -> bool {
        let mut inner = self.inner.write();
        if inner.chunks.contains_key(&addr) {
            return true;
        }
        if inner.used_bytes + len > self.capacity {
            return false;
        }

        inner.chunks.insert(addr, data());
        inner.order.push(addr);
        inner.used_bytes += len;
        true
    }

    /// Whether `addr` is buffered
    pub fn has(&self, addr: &Address) -> bool {
        self.inner.read().chunks.contains_key(addr)
    }

    /// The buffered bytes for `addr`
    pub fn get(&self, addr: &Address) -> Option<Bytes> {
        self.inner.read().chunks.get(addr).cloned()
    }

    /// Number of buffered chunks
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload bytes buffered so far
    pub fn used_bytes(&self) -> usize {
        self.inner.read().used_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Budget left before adds start failing
    pub fn remaining(&self) -> usize {
        self.capacity - self.used_bytes()
    }

    /// Upper bound on the size of a table holding every buffered chunk
    pub fn max_table_size(&self) -> usize {
        let inner = self.inner.read();
        max_table_size(inner.order.len(), inner.used_bytes)
    }

    /// Buffered chunks in insertion order
    fn snapshot(&self) -> Vec<(Address, Bytes)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|addr| inner.chunks.get(addr).map(|data| (*addr, data.clone())))
            .collect()
    }

    /// Write every buffered chunk that `existing` does not already hold.
    ///
    /// Chunks are emitted in insertion order. `existing` is asked once, with a
    /// single batch covering every buffered address.
    pub fn write(
        &self,
        writer: &mut TableWriter,
        existing: &dyn ChunkReader,
    ) -> Result<FlushStats> {
        let snapshot = self.snapshot();
        write_snapshot(&snapshot, writer, existing)
    }

    /// Size a writer, write every new chunk and finish the table.
    ///
    /// Returns `None` when `existing` already held every buffered chunk.
    pub fn flush(
        &self,
        existing: &dyn ChunkReader,
        config: TableConfig,
    ) -> Result<Option<FinishedTable>> {
        let snapshot = self.snapshot();
        let total = snapshot.iter().map(|(_, data)| data.len()).sum();
        let mut writer = TableWriter::with_config(max_table_size(snapshot.len(), total), config);

        let stats = write_snapshot(&snapshot, &mut writer, existing)?;
        if stats.written == 0 {
            return Ok(None);
        }
        writer.finish().map(Some)
    }
}

fn write_snapshot(
    snapshot: &[(Address, Bytes)],
    writer: &mut TableWriter,
    existing: &dyn ChunkReader,
) -> Result<FlushStats> {
    let addrs: Vec<Address> = snapshot.iter().map(|(addr, _)| *addr).collect();
    let mut batch = HasBatch::new(&addrs);
    existing.has_many(&mut batch)?;

    let mut stats = FlushStats::default();
    for (record, (addr, data)) in batch.records().iter().zip(snapshot) {
        if record.found {
            stats.skipped += 1;
            continue;
        }
        writer.write_chunk(*addr, data)?;
        stats.written += 1;
        stats.written_bytes += data.len();
    }

    debug!(
        "MemTable write: {} chunks written ({} bytes), {} already persisted",
        stats.written, stats.written_bytes, stats.skipped
    );

    Ok(stats)
}

impl ChunkReader for MemTable {
    fn has(&self, addr: &Address) -> Result<bool> {
        Ok(MemTable::has(self, addr))
    }

    fn get(&self, addr: &Address) -> Result<Option<Bytes>> {
        Ok(MemTable::get(self, addr))
    }

    fn has_many(&self, batch: &mut HasBatch) -> Result<bool> {
        let inner = self.inner.read();
        batch.resolve_with(|addr| Ok(inner.chunks.contains_key(addr)))
    }

    fn get_many(&self, batch: &mut GetBatch) -> Result<bool> {
        let inner = self.inner.read();
        batch.resolve_with(|addr| Ok(inner.chunks.get(addr).cloned()))
    }
}
