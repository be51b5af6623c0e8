//! The chunk source capability and batch lookup state
//!
//! Anything that can answer "do you have this address" and "give me these
//! bytes" implements [`ChunkReader`]: the memory table, a table reader and a
//! group of other readers. Batch lookups thread a single owned [`HasBatch`] or
//! [`GetBatch`] through several sources; each source resolves what it can and
//! leaves the rest for the next one.

use crate::addr::Address;
use crate::Result;
use bytes::Bytes;

/// A source of chunks that can be queried by address
pub trait ChunkReader: Send + Sync {
    /// Whether this source holds `addr`
    fn has(&self, addr: &Address) -> Result<bool>;

    /// The bytes stored under `addr`, or `None` on a miss
    fn get(&self, addr: &Address) -> Result<Option<Bytes>>;

    /// Mark every unresolved record this source holds as found.
    ///
    /// Returns `true` if at least one record is still unresolved afterwards.
    fn has_many(&self, batch: &mut HasBatch) -> Result<bool>;

    /// Fill every unresolved record this source holds.
    ///
    /// Returns `true` if at least one record is still unresolved afterwards.
    fn get_many(&self, batch: &mut GetBatch) -> Result<bool>;
}

/// Per-address state of a batch membership query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasRecord {
    pub addr: Address,
    pub found: bool,
}

/// Per-address state of a batch content query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRecord {
    pub addr: Address,
    pub data: Option<Bytes>,
}

/// Owned state for one batch membership query, in request order
#[derive(Debug, Clone, Default)]
pub struct HasBatch {
    records: Vec<HasRecord>,
    unresolved: usize,
}

impl HasBatch {
    /// Start a batch with every address unresolved
    pub fn new(addrs: &[Address]) -> Self {
        let records = addrs
            .iter()
            .map(|&addr| HasRecord { addr, found: false })
            .collect::<Vec<_>>();
        let unresolved = records.len();
        Self { records, unresolved }
    }

    /// Whether any record is still unresolved
    pub fn remaining(&self) -> bool {
        self.unresolved > 0
    }

    /// Number of unresolved records
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[HasRecord] {
        &self.records
    }

    /// Run `probe` against every unresolved record, marking hits as found.
    ///
    /// Returns whether anything remains unresolved.
    pub fn resolve_with<F>(&mut self, mut probe: F) -> Result<bool>
    where
        F: FnMut(&Address) -> Result<bool>,
    {
        for record in self.records.iter_mut().filter(|r| !r.found) {
            if probe(&record.addr)? {
                record.found = true;
                self.unresolved -= 1;
            }
        }
        Ok(self.remaining())
    }

    /// Addresses no source has claimed yet
    pub fn missing(&self) -> impl Iterator<Item = &Address> {
        self.records.iter().filter(|r| !r.found).map(|r| &r.addr)
    }

    /// Found flags in request order
    pub fn into_found(self) -> Vec<bool> {
        self.records.into_iter().map(|r| r.found).collect()
    }
}

/// Owned state for one batch content query, in request order
#[derive(Debug, Clone, Default)]
pub struct GetBatch {
    records: Vec<GetRecord>,
    unresolved: usize,
}

impl GetBatch {
    /// Start a batch with every slot empty
    pub fn new(addrs: &[Address]) -> Self {
        let records = addrs
            .iter()
            .map(|&addr| GetRecord { addr, data: None })
            .collect::<Vec<_>>();
        let unresolved = records.len();
        Self { records, unresolved }
    }

    /// Whether any slot is still empty
    pub fn remaining(&self) -> bool {
        self.unresolved > 0
    }

    /// Number of empty slots
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[GetRecord] {
        &self.records
    }

    /// Run `fetch` against every empty slot, storing whatever it returns.
    ///
    /// Returns whether any slot is still empty.
    pub fn resolve_with<F>(&mut self, mut fetch: F) -> Result<bool>
    where
        F: FnMut(&Address) -> Result<Option<Bytes>>,
    {
        for record in self.records.iter_mut().filter(|r| r.data.is_none()) {
            if let Some(data) = fetch(&record.addr)? {
                record.data = Some(data);
                self.unresolved -= 1;
            }
        }
        Ok(self.remaining())
    }

    /// Addresses no source has filled yet
    pub fn missing(&self) -> impl Iterator<Item = &Address> {
        self.records
            .iter()
            .filter(|r| r.data.is_none())
            .map(|r| &r.addr)
    }

    /// Slot contents in request order
    pub fn into_data(self) -> Vec<Option<Bytes>> {
        self.records.into_iter().map(|r| r.data).collect()
    }
}
