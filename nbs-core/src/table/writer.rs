//! Table writer: serializes chunks into an immutable table

use super::format::{
    encode_record, table_checksum, Footer, IndexEntry, FOOTER_SIZE, INDEX_ENTRY_SIZE,
};
use super::{FinishedTable, TableConfig};
use crate::addr::{compute_addr, Address};
use crate::{NbsError, Result};
use bytes::{BufMut, BytesMut};
use std::collections::HashSet;
use tracing::debug;

/// Writes chunks into an owned buffer reserved up front.
///
/// The writer is sized once, with [`max_table_size`](super::max_table_size)
/// for the chunks the caller intends to write. Every [`write_chunk`] checks
/// that the record plus the index and footer still fit in that capacity, so
/// [`finish`] never grows the buffer.
///
/// [`write_chunk`]: TableWriter::write_chunk
/// [`finish`]: TableWriter::finish
pub struct TableWriter {
    buf: BytesMut,
    capacity: usize,
    config: TableConfig,
    index: Vec<IndexEntry>,
    seen: HashSet<Address>,
    payload_bytes: u64,
}

impl TableWriter {
    /// Create a writer for a table of at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self::with_config(capacity, TableConfig::default())
    }

    /// Create a writer with an explicit table configuration
    pub fn with_config(capacity: usize, config: TableConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            config,
            index: Vec::new(),
            seen: HashSet::new(),
            payload_bytes: 0,
        }
    }

    /// Append one chunk.
    ///
    /// Writing the same address twice, or writing past the capacity the
    /// writer was sized for, is a caller bug and leaves the writer unchanged.
    pub fn write_chunk(&mut self, addr: Address, data: &[u8]) -> Result<()> {
        if self.seen.contains(&addr) {
            return Err(NbsError::DuplicateChunk(addr));
        }

        let record = encode_record(data, self.config.compression);
        let needed = self.buf.len()
            + record.len()
            + (self.index.len() + 1) * INDEX_ENTRY_SIZE
            + FOOTER_SIZE;
        if needed > self.capacity {
            return Err(NbsError::TableOverflow {
                needed,
                capacity: self.capacity,
            });
        }

        let length = u32::try_from(record.len()).map_err(|_| NbsError::TableOverflow {
            needed,
            capacity: u32::MAX as usize,
        })?;

        self.index.push(IndexEntry {
            addr,
            offset: self.buf.len() as u64,
            length,
        });
        self.buf.put_slice(&record);
        self.seen.insert(addr);
        self.payload_bytes += data.len() as u64;

        Ok(())
    }

    /// Number of chunks written so far
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Uncompressed payload bytes written so far
    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Capacity the writer was sized for
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write the index and footer and hand over the finished bytes.
    ///
    /// Consumes the writer, so a table can only be finished once.
    pub fn finish(mut self) -> Result<FinishedTable> {
        let records_len = self.buf.len() as u64;
        let chunk_count = u32::try_from(self.index.len())
            .map_err(|_| NbsError::Corruption("too many chunks for one table".into()))?;

        self.index.sort_unstable_by_key(|entry| entry.addr);

        let index_start = self.buf.len();
        for entry in &self.index {
            entry.encode(&mut self.buf);
        }
        let index_bytes = &self.buf[index_start..];
        let name = compute_addr(index_bytes);
        let checksum = table_checksum(index_bytes, chunk_count, records_len);

        Footer {
            chunk_count,
            records_len,
            checksum,
        }
        .encode(&mut self.buf);

        debug!(
            "Finished table {} with {} chunks ({} bytes, {} payload bytes)",
            name,
            chunk_count,
            self.buf.len(),
            self.payload_bytes
        );

        Ok(FinishedTable {
            name,
            data: self.buf.freeze(),
            chunk_count,
            payload_bytes: self.payload_bytes,
        })
    }
}
