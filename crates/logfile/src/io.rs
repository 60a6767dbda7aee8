//! File I/O backends.
//!
//! A [`DataFile`](crate::DataFile) performs positional reads and sequential
//! appends through an [`IoBackend`]. Two backends exist: buffered standard
//! file I/O for normal operation, and a read-only memory map used to speed up
//! the initial index load when `MMapAtStartup` is set.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::Mmap;

/// Which backend to open a data file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Standard file I/O: positional reads, appending writes.
    Standard,
    /// Read-only memory map. Writes are rejected.
    Mmap,
}

/// Positional-read / append-write handle over one file.
pub trait IoBackend: Send + Sync {
    /// Fills `buf` with bytes starting at `offset`. Short reads are errors.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Appends `buf` at the end of the file. Short writes are errors.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flushes written data to durable storage.
    fn sync(&self) -> io::Result<()>;

    /// Current file size in bytes.
    fn size(&self) -> io::Result<u64>;
}

#[cfg(unix)]
fn pread_exact(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn pread_exact(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of data file",
            ));
        }
        let rest = buf;
        buf = &mut rest[n..];
        offset += n as u64;
    }
    Ok(())
}

/// Standard file I/O backend.
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Opens (or creates) `path` for appending and positional reads.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }
}

impl IoBackend for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        pread_exact(&self.file, buf, offset)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.file.write_all(buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Read-only memory-mapped backend.
///
/// An empty file cannot be mapped, so the map is absent until the file has
/// content; reads against an empty map report end-of-file.
pub struct MmapIo {
    map: Option<Mmap>,
    len: u64,
}

impl MmapIo {
    /// Maps `path` read-only, creating the file if it does not exist.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map, len })
    }
}

impl IoBackend for MmapIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.len)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of mapped file")
            })?;
        match &self.map {
            Some(map) => {
                buf.copy_from_slice(&map[offset as usize..end as usize]);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read from empty mapped file",
            )),
        }
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mmap backend is read-only",
        ))
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len)
    }
}
