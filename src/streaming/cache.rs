//! Local stores for bytes fetched from upstream.
//!
//! A cache is a plain random-access byte store: it knows nothing about which spans are valid.
//! That bookkeeping lives in [`RangeSet`](super::RangeSet), owned by the stream.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Random-access byte store used to keep fetched bytes.
pub trait LocalCache {
    /// Writes `bytes` at `offset`, growing the store if needed.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the store cannot be written.
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()>;

    /// Reads up to `len` bytes at `offset`.
    ///
    /// Fewer bytes are returned only if the store ends before `offset + len`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the store cannot be read.
    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;
}

impl<C: LocalCache + ?Sized> LocalCache for &mut C {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, bytes)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        (**self).read_at(offset, len)
    }
}

/// In-memory cache backed by a growable buffer.
///
/// Writing past the current end zero-fills the gap.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    buf: Vec<u8>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the backing buffer, including zero-filled gaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn to_index(offset: u64) -> io::Result<usize> {
    usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))
}

impl LocalCache for MemoryCache {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let start = to_index(offset)?;
        let end = start
            .checked_add(bytes.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write overflows"))?;
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = to_index(offset)?.min(self.buf.len());
        let end = start.saturating_add(len).min(self.buf.len());
        Ok(self.buf[start..end].to_vec())
    }
}

/// Cache stored in a file on disk.
///
/// Use [`FileCache::open`] for a named file that outlives the process, or
/// [`FileCache::temp`] for an anonymous file removed by the OS once dropped.
#[derive(Debug)]
pub struct FileCache {
    file: File,
    path: Option<PathBuf>,
}

impl FileCache {
    /// Opens (or creates) the file at `path`.
    ///
    /// Existing contents are kept; they only become visible to a stream once the matching spans
    /// have been fetched again in that stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directories or the file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            file,
            path: Some(path),
        })
    }

    /// Creates an anonymous temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn temp() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            path: None,
        })
    }

    /// Returns the backing path, if the cache is a named file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl LocalCache for FileCache {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        (&mut self.file).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}
