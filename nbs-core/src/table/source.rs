//! Random-access byte sources backing table readers

use bytes::Bytes;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Positional reads against immutable bytes
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read; fewer than requested means the end
    /// of the source was reached.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Fill `buf` completely from `offset`, failing on a short read
pub fn read_exact_at<R: ReadAt + ?Sized>(
    source: &R,
    buf: &mut [u8],
    offset: u64,
) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at offset {}: wanted {} bytes, got {}",
                    offset,
                    buf.len(),
                    filled
                ),
            ));
        }
        filled += n;
    }
    Ok(())
}

fn read_from_slice(data: &[u8], buf: &mut [u8], offset: u64) -> usize {
    let start = match usize::try_from(offset) {
        Ok(start) if start < data.len() => start,
        _ => return 0,
    };
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

impl ReadAt for Bytes {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(read_from_slice(self, buf, offset))
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(read_from_slice(self, buf, offset))
    }
}

/// A table file on disk.
///
/// Reads are positional (`pread` on Unix, `seek_read` on Windows), so any
/// number of threads can read the same source at once without a lock.
/// Elsewhere the file is reopened for each read.
pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSource {
    /// Open `path` for positional reads
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File length at open time
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(unix)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)
    }

    #[cfg(windows)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

impl ReadAt for FileSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        // Never read past the length the table was opened with
        let left = usize::try_from(self.len - offset).unwrap_or(usize::MAX);
        let n = buf.len().min(left);
        self.pread(&mut buf[..n], offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_bytes_read_at() {
        let data = Bytes::from_static(b"0123456789");
        let mut buf = [0u8; 4];
        assert_eq!(data.read_at(&mut buf, 2).unwrap(), 4);
        assert_eq!(&buf, b"2345");

        // Short read at the tail, nothing past the end
        assert_eq!(data.read_at(&mut buf, 8).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(data.read_at(&mut buf, 10).unwrap(), 0);
        assert_eq!(data.read_at(&mut buf, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_read_exact_at_reports_eof() {
        let data = b"abc".to_vec();
        let mut buf = [0u8; 3];
        read_exact_at(&data, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"abc");

        let err = read_exact_at(&data, &mut buf, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_file_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("source.bin");
        File::create(&path)
            .unwrap()
            .write_all(b"file backed bytes")
            .unwrap();

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.len(), 17);
        assert_eq!(source.path(), path.as_path());

        let mut buf = [0u8; 6];
        read_exact_at(&source, &mut buf, 5).unwrap();
        assert_eq!(&buf, b"backed");
        assert_eq!(source.read_at(&mut buf, 17).unwrap(), 0);
    }

    #[test]
    fn test_file_source_concurrent_reads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared.bin");
        let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        File::create(&path).unwrap().write_all(&data).unwrap();

        let source = Arc::new(FileSource::open(&path).unwrap());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let source = Arc::clone(&source);
                std::thread::spawn(move || {
                    let mut buf = [0u8; 512];
                    for i in 0..64u64 {
                        let offset = (t * 7919 + i * 1021) % (64 * 1024 - 512);
                        read_exact_at(source.as_ref(), &mut buf, offset).unwrap();
                        let expected: Vec<u8> =
                            (offset..offset + 512).map(|j| (j % 251) as u8).collect();
                        assert_eq!(&buf[..], expected.as_slice());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_file_source_stops_at_open_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("growing.bin");
        File::create(&path).unwrap().write_all(b"0123").unwrap();
        let source = FileSource::open(&path).unwrap();

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"4567")
            .unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(source.read_at(&mut buf, 2).unwrap(), 2);
        assert_eq!(&buf[..2], b"23");
    }
}
