//! # logfile — append-only data segments
//!
//! The on-disk layer of the LodeKV storage engine. A database directory holds
//! numbered, append-only data segments plus a handful of single-record
//! bookkeeping files, all sharing one record framing:
//!
//! ```text
//! [crc32: u32 LE][type: u8][key_size: varint][value_size: varint][key][value]
//! ```
//!
//! `crc32` (IEEE) covers everything after itself, so a torn tail or a flipped
//! bit is caught on read. Records are contiguous within a file; the offset of
//! the next record is always `offset + size` of the previous one.
//!
//! ## Files
//!
//! | Name            | Content                                              |
//! |-----------------|------------------------------------------------------|
//! | `%09d.data`     | data segment; exactly one per shard is writable      |
//! | `hint-index`    | `(key → position)` records written by merge          |
//! | `merge-finished`| single record marking a completed merge              |
//! | `seq.no`        | persisted sequence number, written at close          |
//! | `nextFile-id`   | persisted file-id counter, written at close          |
//!
//! ## Example
//!
//! ```rust,no_run
//! use logfile::{DataFile, IoType, LogRecord, RecordType};
//! use logfile::record::encode_record;
//!
//! let dir = std::path::Path::new("/tmp/lode");
//! let mut file = DataFile::open(dir, 0, IoType::Standard).unwrap();
//! let (bytes, _) = encode_record(&LogRecord {
//!     key: b"name".to_vec(),
//!     value: b"lode".to_vec(),
//!     rec_type: RecordType::Normal,
//! });
//! file.write(&bytes).unwrap();
//! let (rec, _) = file.read_record(0).unwrap().unwrap();
//! assert_eq!(rec.value, b"lode");
//! ```

pub mod io;
pub mod record;
pub mod varint;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use io::{FileIo, IoBackend, IoType, MmapIo};
pub use record::{LogRecord, RecordPos, RecordType};

use record::{decode_header, encode_record, CRC_LEN, MAX_HEADER_LEN};

/// Extension of numbered data segments.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Hint file produced by merge: `(key → position)` records.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Marker whose presence means a merge completed; its value is the first
/// file id the merge did not cover.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Sequence number persisted at close.
pub const SEQ_NO_FILE_NAME: &str = "seq.no";
/// File-id counter persisted at close.
pub const NEXT_FILE_ID_FILE_NAME: &str = "nextFile-id";

/// Errors from the record codec and segment I/O.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record that cannot be parsed (bad type byte, negative size).
    #[error("corrupt record")]
    Corrupt,

    /// A record whose stored CRC does not match its content.
    #[error("invalid record crc")]
    InvalidCrc,
}

/// Path of the numbered data segment `file_id` inside `dir`.
pub fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
}

/// One append-only segment: a file id, the current write offset, and the I/O
/// handle. The write offset is only meaningful for the active (writable)
/// file; sealed files are read through [`DataFile::read_record`] alone.
pub struct DataFile {
    file_id: u32,
    write_off: u32,
    io: Box<dyn IoBackend>,
}

impl DataFile {
    /// Opens (or creates) the numbered segment `file_id` inside `dir`,
    /// positioning the write offset at the existing end.
    pub fn open(dir: &Path, file_id: u32, io_type: IoType) -> Result<Self, RecordError> {
        Self::open_path(&data_file_path(dir, file_id), file_id, io_type)
    }

    /// Opens the hint file written by merge.
    pub fn open_hint_file(dir: &Path) -> Result<Self, RecordError> {
        Self::open_path(&dir.join(HINT_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens the merge-finished marker file.
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self, RecordError> {
        Self::open_path(&dir.join(MERGE_FINISHED_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens the persisted sequence-number file.
    pub fn open_seq_no_file(dir: &Path) -> Result<Self, RecordError> {
        Self::open_path(&dir.join(SEQ_NO_FILE_NAME), 0, IoType::Standard)
    }

    /// Opens the persisted file-id counter file.
    pub fn open_next_file_id_file(dir: &Path) -> Result<Self, RecordError> {
        Self::open_path(&dir.join(NEXT_FILE_ID_FILE_NAME), 0, IoType::Standard)
    }

    fn open_path(path: &Path, file_id: u32, io_type: IoType) -> Result<Self, RecordError> {
        let io: Box<dyn IoBackend> = match io_type {
            IoType::Standard => Box::new(FileIo::open(path)?),
            IoType::Mmap => Box::new(MmapIo::open(path)?),
        };
        let write_off = io.size()? as u32;
        Ok(Self {
            file_id,
            write_off,
            io,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u32 {
        self.write_off
    }

    /// Appends raw encoded bytes, advancing the write offset.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), RecordError> {
        self.io.write(buf)?;
        self.write_off += buf.len() as u32;
        Ok(())
    }

    /// Appends a hint record: the live user key with its encoded position as
    /// the value.
    pub fn write_hint_record(&mut self, key: &[u8], pos: &RecordPos) -> Result<(), RecordError> {
        let (bytes, _) = encode_record(&LogRecord {
            key: key.to_vec(),
            value: pos.encode(),
            rec_type: RecordType::Normal,
        });
        self.write(&bytes)
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns `Ok(None)` at end-of-file, which includes a record whose
    /// header or body extends past the end of the file (a torn tail).
    /// A CRC mismatch is [`RecordError::InvalidCrc`]; recovery treats it as
    /// end-of-file for this segment, readers treat it as corruption.
    pub fn read_record(&self, offset: u32) -> Result<Option<(LogRecord, u32)>, RecordError> {
        let file_size = self.io.size()?;
        let offset = offset as u64;
        if offset >= file_size {
            return Ok(None);
        }

        let header_cap = MAX_HEADER_LEN.min((file_size - offset) as usize);
        let mut header_buf = vec![0u8; header_cap];
        self.io.read_at(&mut header_buf, offset)?;

        let (header, header_len) = match decode_header(&header_buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let total = header_len + header.key_size + header.value_size;
        if offset + total as u64 > file_size {
            return Ok(None);
        }

        let mut kv = vec![0u8; header.key_size + header.value_size];
        self.io.read_at(&mut kv, offset + header_len as u64)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_buf[CRC_LEN..header_len]);
        hasher.update(&kv);
        if hasher.finalize() != header.crc {
            return Err(RecordError::InvalidCrc);
        }

        let value = kv.split_off(header.key_size);
        Ok(Some((
            LogRecord {
                key: kv,
                value,
                rec_type: header.rec_type,
            },
            total as u32,
        )))
    }

    /// Flushes written data to durable storage.
    pub fn sync(&self) -> Result<(), RecordError> {
        self.io.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
