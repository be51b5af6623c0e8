//! BlockStore - manages one store directory

use super::manifest::Manifest;
use super::StoreConfig;
use crate::addr::{Address, Chunk};
use crate::chunk_source::ChunkReader;
use crate::config::TABLE_EXTENSION;
use crate::memtable::MemTable;
use crate::reader_group::ChunkReaderGroup;
use crate::table::{open_table_file, table_file_path, write_table_file, FileSource, TableReader};
use crate::{NbsError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A content-addressed chunk store backed by a directory of tables.
///
/// New chunks go to a MemTable; [`BlockStore::flush`] turns the MemTable into a
/// table file and records it in the manifest. Chunks still in the MemTable are
/// not durable until flushed.
pub struct BlockStore {
    config: StoreConfig,
    state: RwLock<StoreState>,
}

struct StoreState {
    memtable: MemTable,
    /// Open tables, oldest first, matching the manifest
    tables: Vec<TableReader<FileSource>>,
    manifest: Manifest,
}

impl StoreState {
    /// MemTable first, then tables newest first
    fn sources(&self) -> ChunkReaderGroup<'_> {
        let mut members: Vec<&dyn ChunkReader> = Vec::with_capacity(self.tables.len() + 1);
        members.push(&self.memtable);
        members.extend(self.tables.iter().rev().map(|t| t as &dyn ChunkReader));
        ChunkReaderGroup::new(members)
    }

    fn persisted(&self) -> ChunkReaderGroup<'_> {
        ChunkReaderGroup::new(
            self.tables
                .iter()
                .rev()
                .map(|t| t as &dyn ChunkReader)
                .collect(),
        )
    }
}

impl BlockStore {
    /// Open the store in `config.dir`, creating it if needed
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.dir.as_os_str().is_empty() {
            return Err(NbsError::Config("store directory is not set".into()));
        }
        fs::create_dir_all(&config.dir)?;

        let memtable = MemTable::new(config.memtable_capacity)?;
        let manifest = Manifest::load(&config.dir)?;

        let mut tables = Vec::with_capacity(manifest.tables.len());
        for name in &manifest.tables {
            tables.push(Self::open_table(&config.dir, name)?);
        }
        Self::scan_dir(&config.dir, &manifest)?;

        info!(
            "Opened block store at {:?} with {} tables",
            config.dir,
            tables.len()
        );

        Ok(Self {
            config,
            state: RwLock::new(StoreState {
                memtable,
                tables,
                manifest,
            }),
        })
    }

    fn open_table(dir: &Path, name: &Address) -> Result<TableReader<FileSource>> {
        let path = table_file_path(dir, name);
        if !path.exists() {
            return Err(NbsError::Manifest(format!(
                "table {} listed in manifest is missing",
                name
            )));
        }

        let reader = open_table_file(&path)?;
        if reader.name() != *name {
            return Err(NbsError::Corruption(format!(
                "table file {:?} holds table {}",
                path,
                reader.name()
            )));
        }
        Ok(reader)
    }

    /// Remove temporary files left by an interrupted write and warn about
    /// table files the manifest does not list
    fn scan_dir(dir: &Path, manifest: &Manifest) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("tmp") => {
                    warn!("Removing leftover temporary file {:?}", path);
                    fs::remove_file(&path)?;
                }
                Some(ext) if ext == TABLE_EXTENSION => {
                    let tracked = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(|stem| Address::from_hex(stem).ok())
                        .map_or(false, |name| manifest.contains(&name));
                    if !tracked {
                        warn!("Ignoring table file {:?} not listed in manifest", path);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store a copy of `data` and return its address.
    ///
    /// A full MemTable is flushed first.
    pub fn put(&self, data: &[u8]) -> Result<Address> {
        self.put_chunk(&Chunk::new(Bytes::copy_from_slice(data)))
    }

    /// Store a chunk, sharing its bytes with the MemTable
    pub fn put_chunk(&self, chunk: &Chunk) -> Result<Address> {
        let capacity = self.config.memtable_capacity;
        let too_large = || NbsError::ChunkTooLarge {
            size: chunk.len(),
            capacity,
        };
        if chunk.len() > capacity {
            return Err(too_large());
        }

        if self.state.read().memtable.add(chunk) {
            return Ok(chunk.addr());
        }

        let mut state = self.state.write();
        // Another writer may have flushed while we waited for the lock
        if !state.memtable.add(chunk) {
            self.flush_locked(&mut state)?;
            if !state.memtable.add(chunk) {
                return Err(too_large());
            }
        }
        Ok(chunk.addr())
    }

    pub fn has(&self, addr: &Address) -> Result<bool> {
        let state = self.state.read();
        let found = state.sources().has(addr)?;
        Ok(found)
    }

    pub fn get(&self, addr: &Address) -> Result<Option<Bytes>> {
        let state = self.state.read();
        let data = state.sources().get(addr)?;
        Ok(data)
    }

    /// Membership of every address, in request order
    pub fn has_many(&self, addrs: &[Address]) -> Result<Vec<bool>> {
        let state = self.state.read();
        let batch = state.sources().has_all(addrs)?;
        Ok(batch.into_found())
    }

    /// Contents of every address, in request order
    pub fn get_many(&self, addrs: &[Address]) -> Result<Vec<Option<Bytes>>> {
        let state = self.state.read();
        let batch = state.sources().get_all(addrs)?;
        Ok(batch.into_data())
    }

    /// Write the MemTable out as a new table.
    ///
    /// Returns the new table's name, or `None` if every buffered chunk was
    /// already persisted.
    pub fn flush(&self) -> Result<Option<Address>> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut StoreState) -> Result<Option<Address>> {
        if state.memtable.is_empty() {
            return Ok(None);
        }

        let table = state
            .memtable
            .flush(&state.persisted(), self.config.table)?;

        let name = match table {
            Some(table) => {
                let path = write_table_file(&self.config.dir, &table)?;
                let reader = open_table_file(&path)?;

                if !state.manifest.contains(&table.name) {
                    let mut manifest = state.manifest.clone();
                    manifest.tables.push(table.name);
                    manifest.save(&self.config.dir)?;
                    state.manifest = manifest;
                    state.tables.push(reader);
                }
                info!(
                    "Flushed {} chunks to table {} ({} tables)",
                    table.chunk_count,
                    table.name,
                    state.tables.len()
                );
                Some(table.name)
            }
            None => {
                debug!(
                    "Flush found all {} buffered chunks already persisted",
                    state.memtable.len()
                );
                None
            }
        };

        state.memtable = MemTable::new(self.config.memtable_capacity)?;
        Ok(name)
    }

    /// Names of the store's tables, oldest first
    pub fn tables(&self) -> Vec<Address> {
        self.state.read().manifest.tables.clone()
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            tables: state.tables.len(),
            persisted_chunks: state.tables.iter().map(|t| t.chunk_count()).sum(),
            persisted_bytes: state.tables.iter().map(|t| t.records_len()).sum(),
            memtable_chunks: state.memtable.len(),
            memtable_bytes: state.memtable.used_bytes(),
        }
    }
}

/// Block store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tables: usize,
    pub persisted_chunks: usize,
    /// Record bytes across all tables, after compression
    pub persisted_bytes: u64,
    pub memtable_chunks: usize,
    pub memtable_bytes: usize,
}
