//! Store manifest
//!
//! The manifest is the authoritative list of tables belonging to a store,
//! oldest first. It is a small JSON document rewritten atomically after every
//! flush:
//!
//! ```text
//! {
//!   "version": 1,
//!   "tables": ["0f3c...", "9a41..."]
//! }
//! ```

use crate::addr::Address;
use crate::config::MANIFEST_FILE;
use crate::table::write_atomic;
use crate::{NbsError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Tables belonging to a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Table names, oldest first
    pub tables: Vec<Address>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            tables: Vec::new(),
        }
    }
}

impl Manifest {
    /// Load the manifest in `dir`, or an empty one if there is none yet
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&data)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(NbsError::Manifest(format!(
                "unsupported manifest version {} (expected {})",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Atomically replace the manifest in `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(&dir.join(MANIFEST_FILE), &data)
    }

    pub fn contains(&self, name: &Address) -> bool {
        self.tables.contains(name)
    }
}
