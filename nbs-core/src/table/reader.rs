//! Table reader for querying finished tables

use super::format::{decode_record, table_checksum, Footer, IndexEntry, FOOTER_SIZE};
use super::source::{read_exact_at, ReadAt};
use crate::addr::{compute_addr, Address};
use crate::chunk_source::{ChunkReader, GetBatch, HasBatch};
use crate::{NbsError, Result};
use bytes::Bytes;
use tracing::debug;

/// Read-only view of one finished table.
///
/// The index is parsed and validated once at construction and kept in memory
/// sorted by address. Chunk payloads stay in the backing [`ReadAt`] source and
/// are fetched one record at a time.
pub struct TableReader<R: ReadAt> {
    name: Address,
    index: Vec<IndexEntry>,
    records_len: u64,
    source: R,
}

impl TableReader<Bytes> {
    /// Open a table held entirely in memory
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let table = data.clone();
        Self::new(&table, data)
    }
}

impl<R: ReadAt> TableReader<R> {
    /// Parse the footer and index out of `table`, the exact extent produced by
    /// a finished writer, and serve payload reads from `source`.
    pub fn new(table: &[u8], source: R) -> Result<Self> {
        let len = table.len();
        if len < FOOTER_SIZE {
            return Err(NbsError::Corruption(format!(
                "table of {} bytes is smaller than its footer",
                len
            )));
        }

        let footer = Footer::decode(&table[len - FOOTER_SIZE..])?;
        footer.check_extent(len as u64)?;

        let index_start = footer.records_len as usize;
        let index_bytes = &table[index_start..len - FOOTER_SIZE];
        Self::from_parts(&footer, index_bytes, source)
    }

    /// Read the footer and index of a `len` byte table from `source` itself
    pub fn open(source: R, len: u64) -> Result<Self> {
        if len < FOOTER_SIZE as u64 {
            return Err(NbsError::Corruption(format!(
                "table of {} bytes is smaller than its footer",
                len
            )));
        }

        let mut footer_bytes = [0u8; FOOTER_SIZE];
        read_exact_at(&source, &mut footer_bytes, len - FOOTER_SIZE as u64)?;
        let footer = Footer::decode(&footer_bytes)?;
        footer.check_extent(len)?;

        let index_len = usize::try_from(footer.index_len())
            .map_err(|_| NbsError::Corruption("index too large".into()))?;
        let mut index_bytes = vec![0u8; index_len];
        read_exact_at(&source, &mut index_bytes, footer.records_len)?;
        Self::from_parts(&footer, &index_bytes, source)
    }

    fn from_parts(footer: &Footer, index_bytes: &[u8], source: R) -> Result<Self> {
        let actual = table_checksum(index_bytes, footer.chunk_count, footer.records_len);
        if actual != footer.checksum {
            return Err(NbsError::ChecksumMismatch {
                expected: footer.checksum,
                actual,
            });
        }

        let index = parse_index(index_bytes, footer)?;
        let name = compute_addr(index_bytes);

        debug!(
            "Opened table {} with {} chunks ({} record bytes)",
            name,
            index.len(),
            footer.records_len
        );

        Ok(Self {
            name,
            index,
            records_len: footer.records_len,
            source,
        })
    }

    /// Table name: the address of its serialized index
    pub fn name(&self) -> Address {
        self.name
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Bytes occupied by chunk records
    pub fn records_len(&self) -> u64 {
        self.records_len
    }

    /// Addresses of every chunk in the table, ascending
    pub fn addrs(&self) -> impl Iterator<Item = &Address> {
        self.index.iter().map(|entry| &entry.addr)
    }

    /// The backing byte source
    pub fn source(&self) -> &R {
        &self.source
    }

    fn lookup(&self, addr: &Address) -> Option<&IndexEntry> {
        self.index
            .binary_search_by(|entry| entry.addr.cmp(addr))
            .ok()
            .map(|i| &self.index[i])
    }

    /// Whether the table holds `addr`; answered from the index alone
    pub fn has(&self, addr: &Address) -> bool {
        self.lookup(addr).is_some()
    }

    /// Fetch the chunk stored under `addr` with one positional read
    pub fn get(&self, addr: &Address) -> Result<Option<Bytes>> {
        let entry = match self.lookup(addr) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut record = vec![0u8; entry.length as usize];
        read_exact_at(&self.source, &mut record, entry.offset)?;
        let data = decode_record(&record)?;

        if compute_addr(&data) != *addr {
            return Err(NbsError::Corruption(format!(
                "record at offset {} does not hash to {}",
                entry.offset, addr
            )));
        }

        Ok(Some(data))
    }
}

/// Decode and validate a serialized index.
///
/// Records must tile the record region exactly, with no gaps or overlaps, and
/// no address may appear twice.
fn parse_index(mut bytes: &[u8], footer: &Footer) -> Result<Vec<IndexEntry>> {
    let mut index = Vec::with_capacity(footer.chunk_count as usize);
    for _ in 0..footer.chunk_count {
        index.push(IndexEntry::decode(&mut bytes)?);
    }
    if !bytes.is_empty() {
        return Err(NbsError::Corruption(format!(
            "{} trailing bytes after index",
            bytes.len()
        )));
    }

    let mut by_offset: Vec<&IndexEntry> = index.iter().collect();
    by_offset.sort_unstable_by_key(|entry| entry.offset);
    let mut expected_offset = 0u64;
    for entry in by_offset {
        if entry.offset != expected_offset {
            return Err(NbsError::Corruption(format!(
                "record for {} starts at {}, expected {}",
                entry.addr, entry.offset, expected_offset
            )));
        }
        expected_offset = entry.end();
    }
    if expected_offset != footer.records_len {
        return Err(NbsError::Corruption(format!(
            "records cover {} bytes, footer says {}",
            expected_offset, footer.records_len
        )));
    }

    index.sort_unstable_by_key(|entry| entry.addr);
    if let Some(pair) = index.windows(2).find(|pair| pair[0].addr == pair[1].addr) {
        return Err(NbsError::Corruption(format!(
            "address {} indexed twice",
            pair[0].addr
        )));
    }

    Ok(index)
}

impl<R: ReadAt> ChunkReader for TableReader<R> {
    fn has(&self, addr: &Address) -> Result<bool> {
        Ok(TableReader::has(self, addr))
    }

    fn get(&self, addr: &Address) -> Result<Option<Bytes>> {
        TableReader::get(self, addr)
    }

    fn has_many(&self, batch: &mut HasBatch) -> Result<bool> {
        batch.resolve_with(|addr| Ok(TableReader::has(self, addr)))
    }

    fn get_many(&self, batch: &mut GetBatch) -> Result<bool> {
        batch.resolve_with(|addr| TableReader::get(self, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{max_table_size, FinishedTable, TableWriter};

    fn build_table(chunks: &[&[u8]]) -> FinishedTable {
        let total = chunks.iter().map(|c| c.len()).sum();
        let mut writer = TableWriter::new(max_table_size(chunks.len(), total));
        for c in chunks {
            writer.write_chunk(compute_addr(c), c).unwrap();
        }
        writer.finish().unwrap()
    }

    fn sample() -> Vec<&'static [u8]> {
        vec![&b"hello2"[..], &b"goodbye2"[..], &b"badbye2"[..]]
    }

    #[test]
    fn test_has_and_get() {
        let chunks = sample();
        let table = build_table(&chunks);
        let reader = TableReader::new(&table.data, table.data.clone()).unwrap();

        assert_eq!(reader.chunk_count(), 3);
        assert_eq!(reader.name(), table.name);
        for c in &chunks {
            let addr = compute_addr(c);
            assert!(reader.has(&addr));
            assert_eq!(reader.get(&addr).unwrap().unwrap(), Bytes::copy_from_slice(c));
        }

        let nope = compute_addr(b"nope");
        assert!(!reader.has(&nope));
        assert!(reader.get(&nope).unwrap().is_none());
    }

    #[test]
    fn test_addrs_sorted() {
        let table = build_table(&sample());
        let reader = TableReader::from_bytes(table.data).unwrap();
        let addrs: Vec<_> = reader.addrs().copied().collect();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }

    #[test]
    fn test_open_reads_tail_from_source() {
        let table = build_table(&sample());
        let len = table.len() as u64;
        let reader = TableReader::open(table.data.to_vec(), len).unwrap();
        assert!(reader.has(&compute_addr(b"goodbye2")));
        assert_eq!(
            reader.get(&compute_addr(b"badbye2")).unwrap(),
            Some(Bytes::from_static(b"badbye2"))
        );
    }

    #[test]
    fn test_truncation_always_detected() {
        let table = build_table(&sample());
        for cut in 1..=table.len() {
            let truncated = table.data.slice(..table.len() - cut);
            assert!(
                TableReader::from_bytes(truncated.clone()).is_err(),
                "table truncated by {} bytes opened",
                cut
            );
            assert!(TableReader::open(truncated.clone(), truncated.len() as u64).is_err());
        }
    }

    #[test]
    fn test_index_corruption_detected() {
        let table = build_table(&sample());
        let mut data = table.data.to_vec();
        let index_start = table.len() - FOOTER_SIZE - 3 * crate::table::INDEX_ENTRY_SIZE;
        data[index_start + 5] ^= 0x01;

        let err = TableReader::from_bytes(Bytes::from(data)).err().unwrap();
        assert!(matches!(err, NbsError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_record_corruption_detected_on_get() {
        let chunks = sample();
        let table = build_table(&chunks);
        let mut data = table.data.to_vec();
        // First record's payload starts after its one byte flag
        data[1] ^= 0xff;

        // The index is intact, so the table still opens
        let reader = TableReader::from_bytes(Bytes::from(data)).unwrap();
        let err = reader.get(&compute_addr(chunks[0])).unwrap_err();
        assert!(err.is_corruption());
        assert!(reader.get(&compute_addr(chunks[1])).unwrap().is_some());
    }

    #[test]
    fn test_batch_lookups() {
        let table = build_table(&sample());
        let reader = TableReader::from_bytes(table.data).unwrap();
        let present = compute_addr(b"hello2");
        let absent = compute_addr(b"absent");

        let mut batch = HasBatch::new(&[present, absent]);
        assert!(reader.has_many(&mut batch).unwrap());
        assert_eq!(batch.into_found(), vec![true, false]);

        let mut batch = GetBatch::new(&[present]);
        assert!(!reader.get_many(&mut batch).unwrap());
        assert_eq!(
            batch.into_data(),
            vec![Some(Bytes::from_static(b"hello2"))]
        );
    }

    #[test]
    fn test_large_compressed_chunk_roundtrip() {
        let big: Vec<u8> = (0..64 * 1024).map(|i| (i % 7) as u8).collect();
        let table = build_table(&[big.as_slice(), &b"tiny"[..]]);
        let reader = TableReader::from_bytes(table.data).unwrap();
        assert_eq!(
            reader.get(&compute_addr(&big)).unwrap().unwrap(),
            Bytes::from(big.clone())
        );
    }
}
