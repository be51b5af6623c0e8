//! Block store - a directory of tables behind one chunk interface

mod block_store;
mod manifest;

pub use block_store::{BlockStore, StoreStats};
pub use manifest::{Manifest, MANIFEST_VERSION};

use crate::table::TableConfig;
use std::path::PathBuf;

/// Block store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the manifest and table files
    pub dir: PathBuf,
    /// MemTable byte budget
    pub memtable_capacity: usize,
    /// Table configuration
    pub table: TableConfig,
}

impl StoreConfig {
    /// Default configuration rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            memtable_capacity: crate::config::MEMTABLE_CAPACITY,
            table: TableConfig::default(),
        }
    }
}
