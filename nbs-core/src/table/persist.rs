//! Table files on disk
//!
//! Finished tables are written next to their final path as `<name>.nbs.tmp`,
//! synced, then renamed into place, so a reader never observes a partially
//! written table file.

use super::reader::TableReader;
use super::source::FileSource;
use super::FinishedTable;
use crate::addr::Address;
use crate::config::TABLE_EXTENSION;
use crate::Result;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Path of the table file named `name` inside `dir`
pub fn table_file_path(dir: &Path, name: &Address) -> PathBuf {
    dir.join(format!("{}.{}", name, TABLE_EXTENSION))
}

/// Persist a finished table into `dir`, returning its path
pub fn write_table_file(dir: &Path, table: &FinishedTable) -> Result<PathBuf> {
    let path = table_file_path(dir, &table.name);
    if path.exists() {
        // Same name means same index, which means same chunks.
        debug!("Table {} already on disk", table.name);
        return Ok(path);
    }

    write_atomic(&path, &table.data)?;
    info!(
        "Wrote table {} ({} chunks, {} bytes)",
        table.name,
        table.chunk_count,
        table.len()
    );
    Ok(path)
}

/// Open a table file for reading
pub fn open_table_file(path: &Path) -> Result<TableReader<FileSource>> {
    let source = FileSource::open(path)?;
    let len = source.len();
    TableReader::open(source, len)
}

/// Write `data` to `path` through a temporary file and an atomic rename
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    // Make the rename itself durable
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::compute_addr;
    use crate::table::{max_table_size, TableWriter};
    use tempfile::TempDir;

    fn finished(chunks: &[&[u8]]) -> FinishedTable {
        let total = chunks.iter().map(|c| c.len()).sum();
        let mut writer = TableWriter::new(max_table_size(chunks.len(), total));
        for c in chunks {
            writer.write_chunk(compute_addr(c), c).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_and_open_table_file() {
        let temp_dir = TempDir::new().unwrap();
        let table = finished(&[&b"alpha"[..], &b"beta"[..]]);

        let path = write_table_file(temp_dir.path(), &table).unwrap();
        assert_eq!(path, table_file_path(temp_dir.path(), &table.name));
        assert!(!path.with_extension("nbs.tmp").exists());

        let reader = open_table_file(&path).unwrap();
        assert_eq!(reader.name(), table.name);
        assert_eq!(
            reader.get(&compute_addr(b"beta")).unwrap().unwrap().as_ref(),
            b"beta"
        );
    }

    #[test]
    fn test_rewrite_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let table = finished(&[&b"gamma"[..]]);
        let first = write_table_file(temp_dir.path(), &table).unwrap();
        let second = write_table_file(temp_dir.path(), &table).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let table = finished(&[&b"delta"[..], &b"epsilon"[..]]);
        let path = write_table_file(temp_dir.path(), &table).unwrap();

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(table.len() as u64 - 3).unwrap();
        drop(file);

        assert!(open_table_file(&path).is_err());
    }
}
