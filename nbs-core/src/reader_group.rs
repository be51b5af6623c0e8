//! Ordered groups of chunk readers
//!
//! A [`ChunkReaderGroup`] presents several sources as one. Single lookups
//! return the first member's hit. Batch lookups thread one batch through the
//! members in order and stop as soon as nothing is left to resolve.

use crate::addr::Address;
use crate::chunk_source::{ChunkReader, GetBatch, HasBatch};
use crate::Result;
use bytes::Bytes;

/// A fixed, ordered set of borrowed chunk readers
pub struct ChunkReaderGroup<'a> {
    members: Vec<&'a dyn ChunkReader>,
}

impl<'a> ChunkReaderGroup<'a> {
    /// Group `members`, queried in the given order
    pub fn new(members: Vec<&'a dyn ChunkReader>) -> Self {
        Self { members }
    }

    /// A group with no members; every lookup misses
    pub fn empty() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Membership of every address in `addrs`, as a fresh batch
    pub fn has_all(&self, addrs: &[Address]) -> Result<HasBatch> {
        let mut batch = HasBatch::new(addrs);
        self.has_many(&mut batch)?;
        Ok(batch)
    }

    /// Contents of every address in `addrs`, as a fresh batch
    pub fn get_all(&self, addrs: &[Address]) -> Result<GetBatch> {
        let mut batch = GetBatch::new(addrs);
        self.get_many(&mut batch)?;
        Ok(batch)
    }
}

impl ChunkReader for ChunkReaderGroup<'_> {
    fn has(&self, addr: &Address) -> Result<bool> {
        for member in &self.members {
            if member.has(addr)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, addr: &Address) -> Result<Option<Bytes>> {
        for member in &self.members {
            if let Some(data) = member.get(addr)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn has_many(&self, batch: &mut HasBatch) -> Result<bool> {
        if !batch.remaining() {
            return Ok(false);
        }
        for member in &self.members {
            if !member.has_many(batch)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn get_many(&self, batch: &mut GetBatch) -> Result<bool> {
        if !batch.remaining() {
            return Ok(false);
        }
        for member in &self.members {
            if !member.get_many(batch)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
