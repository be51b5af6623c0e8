//! Table file binary format: records, index entries and the footer
//!
//! ```text
//! [record 0] ... [record N-1]
//!     flag (u8) | stored bytes | crc32 (u32 over flag + stored bytes)
//! [index entry 0] ... [index entry N-1]      sorted by address
//!     address (20) | offset (u64) | length (u32)
//! [footer]
//!     chunk_count (u32) | records_len (u64) | checksum (u32) | magic "NBSTBL01"
//! ```
//!
//! All integers are little-endian. The footer checksum is a CRC32 over the
//! index bytes followed by the little-endian `chunk_count` and `records_len`.

use crate::addr::{Address, ADDR_SIZE};
use crate::{NbsError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic trailer identifying a table file
pub const TABLE_MAGIC: &[u8; 8] = b"NBSTBL01";

/// Width of a record offset
pub const OFFSET_SIZE: usize = 8;

/// Width of a record length
pub const LENGTH_SIZE: usize = 4;

/// Width of one serialized index entry
pub const INDEX_ENTRY_SIZE: usize = ADDR_SIZE + OFFSET_SIZE + LENGTH_SIZE;

/// Width of a CRC32 checksum
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes a record adds around its stored payload (flag + checksum)
pub const RECORD_OVERHEAD: usize = 1 + CHECKSUM_SIZE;

/// Width of the footer: count + records_len + checksum + magic
pub const FOOTER_SIZE: usize = 4 + 8 + CHECKSUM_SIZE + TABLE_MAGIC.len();

/// How a record's payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Payload stored verbatim
    Raw = 0,
    /// Payload stored as a size-prepended LZ4 block
    Lz4 = 1,
}

impl TryFrom<u8> for RecordKind {
    type Error = NbsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordKind::Raw),
            1 => Ok(RecordKind::Lz4),
            _ => Err(NbsError::InvalidFormat(format!(
                "Invalid record kind: {}",
                value
            ))),
        }
    }
}

/// Upper bound on the size of a table holding `num_chunks` chunks whose
/// payloads sum to `total_data` bytes.
///
/// Records never grow past their raw payload plus [`RECORD_OVERHEAD`], so the
/// bound holds with or without compression.
pub fn max_table_size(num_chunks: usize, total_data: usize) -> usize {
    total_data + num_chunks * (RECORD_OVERHEAD + INDEX_ENTRY_SIZE) + FOOTER_SIZE
}

/// Serialize one chunk payload as a record
pub fn encode_record(data: &[u8], compress: bool) -> Bytes {
    let compressed = if compress && !data.is_empty() {
        let packed = lz4_flex::compress_prepend_size(data);
        (packed.len() < data.len()).then_some(packed)
    } else {
        None
    };

    let (kind, stored): (RecordKind, &[u8]) = match &compressed {
        Some(packed) => (RecordKind::Lz4, packed.as_slice()),
        None => (RecordKind::Raw, data),
    };

    let mut buf = BytesMut::with_capacity(stored.len() + RECORD_OVERHEAD);
    buf.put_u8(kind as u8);
    buf.put_slice(stored);
    let checksum = crc32fast::hash(&buf);
    buf.put_u32_le(checksum);
    buf.freeze()
}

/// Verify a record's checksum and return its payload
pub fn decode_record(record: &[u8]) -> Result<Bytes> {
    if record.len() < RECORD_OVERHEAD {
        return Err(NbsError::Corruption(format!(
            "record of {} bytes is shorter than its framing",
            record.len()
        )));
    }

    let (body, mut trailer) = record.split_at(record.len() - CHECKSUM_SIZE);
    let expected = trailer.get_u32_le();
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(NbsError::ChecksumMismatch { expected, actual });
    }

    let stored = &body[1..];
    match RecordKind::try_from(body[0])? {
        RecordKind::Raw => Ok(Bytes::copy_from_slice(stored)),
        RecordKind::Lz4 => lz4_flex::decompress_size_prepended(stored)
            .map(Bytes::from)
            .map_err(|e| NbsError::Compression(e.to_string())),
    }
}

/// Location of one chunk's record inside a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub addr: Address,
    pub offset: u64,
    pub length: u32,
}

impl IndexEntry {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self.addr.as_bytes());
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.length);
    }

    /// Decode one entry; `buf` must hold at least [`INDEX_ENTRY_SIZE`] bytes
    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        if buf.len() < INDEX_ENTRY_SIZE {
            return Err(NbsError::Corruption("truncated index entry".into()));
        }
        let addr = Address::from_slice(&buf[..ADDR_SIZE])?;
        buf.advance(ADDR_SIZE);
        let offset = buf.get_u64_le();
        let length = buf.get_u32_le();
        Ok(Self {
            addr,
            offset,
            length,
        })
    }

    /// One past the last byte of the record
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length as u64)
    }
}

/// Parsed table footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub chunk_count: u32,
    pub records_len: u64,
    pub checksum: u32,
}

impl Footer {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.chunk_count);
        buf.put_u64_le(self.records_len);
        buf.put_u32_le(self.checksum);
        buf.put_slice(TABLE_MAGIC);
    }

    /// Decode the footer from the last [`FOOTER_SIZE`] bytes of a table
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(NbsError::Corruption(format!(
                "footer must be {} bytes, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }
        if &data[FOOTER_SIZE - TABLE_MAGIC.len()..] != TABLE_MAGIC {
            return Err(NbsError::InvalidFormat("Invalid table magic".into()));
        }

        let chunk_count = data.get_u32_le();
        let records_len = data.get_u64_le();
        let checksum = data.get_u32_le();
        Ok(Self {
            chunk_count,
            records_len,
            checksum,
        })
    }

    /// Byte length of the serialized index this footer describes
    pub fn index_len(&self) -> u64 {
        self.chunk_count as u64 * INDEX_ENTRY_SIZE as u64
    }

    /// Exact byte length of the table this footer describes
    pub fn table_len(&self) -> u64 {
        self.records_len
            .saturating_add(self.index_len())
            .saturating_add(FOOTER_SIZE as u64)
    }

    /// Reject an extent that does not match what the footer claims
    pub fn check_extent(&self, len: u64) -> Result<()> {
        let expected = self.table_len();
        if expected != len {
            return Err(NbsError::Corruption(format!(
                "table extent is {} bytes but footer describes {} bytes",
                len, expected
            )));
        }
        Ok(())
    }
}

/// Checksum over the index bytes and the footer's counters
pub fn table_checksum(index: &[u8], chunk_count: u32, records_len: u64) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(index);
    hasher.update(&chunk_count.to_le_bytes());
    hasher.update(&records_len.to_le_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::compute_addr;

    #[test]
    fn test_record_raw_when_incompressible() {
        let record = encode_record(b"hello2", true);
        assert_eq!(record[0], RecordKind::Raw as u8);
        assert_eq!(record.len(), 6 + RECORD_OVERHEAD);
        assert_eq!(decode_record(&record).unwrap(), Bytes::from_static(b"hello2"));
    }

    #[test]
    fn test_record_compressed_when_smaller() {
        let data = vec![7u8; 4096];
        let record = encode_record(&data, true);
        assert_eq!(record[0], RecordKind::Lz4 as u8);
        assert!(record.len() < data.len());
        assert_eq!(decode_record(&record).unwrap(), Bytes::from(data.clone()));

        let plain = encode_record(&data, false);
        assert_eq!(plain[0], RecordKind::Raw as u8);
        assert_eq!(plain.len(), data.len() + RECORD_OVERHEAD);
    }

    #[test]
    fn test_empty_record() {
        let record = encode_record(b"", true);
        assert_eq!(record.len(), RECORD_OVERHEAD);
        assert!(decode_record(&record).unwrap().is_empty());
    }

    #[test]
    fn test_record_corruption_detected() {
        let mut record = encode_record(b"some payload", false).to_vec();
        record[3] ^= 0xff;
        let err = decode_record(&record).unwrap_err();
        assert!(matches!(err, NbsError::ChecksumMismatch { .. }));

        assert!(decode_record(&[0u8; 2]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_index_entry_encoding() {
        let entry = IndexEntry {
            addr: compute_addr(b"x"),
            offset: 42,
            length: 17,
        };
        let mut buf = BytesMut::new();
        entry.encode(&mut buf);
        assert_eq!(buf.len(), INDEX_ENTRY_SIZE);

        let mut slice = &buf[..];
        assert_eq!(IndexEntry::decode(&mut slice).unwrap(), entry);
        assert!(slice.is_empty());
        assert_eq!(entry.end(), 59);
    }

    #[test]
    fn test_footer_validation() {
        let footer = Footer {
            chunk_count: 2,
            records_len: 100,
            checksum: 0xabcd,
        };
        let mut buf = BytesMut::new();
        footer.encode(&mut buf);
        assert_eq!(buf.len(), FOOTER_SIZE);
        assert_eq!(Footer::decode(&buf).unwrap(), footer);

        let expected_len = 100 + 2 * INDEX_ENTRY_SIZE as u64 + FOOTER_SIZE as u64;
        assert!(footer.check_extent(expected_len).is_ok());
        assert!(footer.check_extent(expected_len - 1).is_err());

        let mut bad = buf.to_vec();
        bad[FOOTER_SIZE - 1] = b'X';
        assert!(matches!(
            Footer::decode(&bad),
            Err(NbsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_max_table_size() {
        assert_eq!(max_table_size(0, 0), FOOTER_SIZE);
        assert_eq!(
            max_table_size(3, 100),
            100 + 3 * (RECORD_OVERHEAD + INDEX_ENTRY_SIZE) + FOOTER_SIZE
        );
    }
}
