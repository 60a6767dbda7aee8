//! Log record encoding and decoding.
//!
//! Every mutation is framed as a single record:
//!
//! ```text
//! [crc32: u32 LE][type: u8][key_size: varint][value_size: varint][key][value]
//! ```
//!
//! The CRC-32 (IEEE) covers everything after itself. The two sizes are
//! zigzag varints, so the header is variable-length, bounded by
//! [`MAX_HEADER_LEN`] bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::varint;
use crate::RecordError;

/// Bytes occupied by the CRC at the front of a record.
pub const CRC_LEN: usize = 4;

/// Upper bound on the encoded header: crc + type + two 5-byte size varints.
pub const MAX_HEADER_LEN: usize = CRC_LEN + 1 + 5 + 5;

/// Kind of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A plain key/value write (used by batch entries).
    Normal = 0,
    /// A tombstone; the key is dead once this record is applied.
    Deleted = 1,
    /// Either a self-committed single-key write or a batch terminator.
    TxnFinished = 2,
}

impl RecordType {
    fn from_u8(byte: u8) -> Result<Self, RecordError> {
        match byte {
            0 => Ok(RecordType::Normal),
            1 => Ok(RecordType::Deleted),
            2 => Ok(RecordType::TxnFinished),
            _ => Err(RecordError::Corrupt),
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: RecordType,
}

/// Location of a record on disk: which file, where in it, and how long the
/// encoded record is. The size feeds reclaim accounting when the record is
/// displaced by a newer write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPos {
    pub file_id: u32,
    pub offset: u32,
    pub size: u32,
}

impl RecordPos {
    /// Encodes the position as three unsigned varints (hint-file value format).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 * 5);
        varint::encode_u64(&mut buf, self.file_id as u64);
        varint::encode_u64(&mut buf, self.offset as u64);
        varint::encode_u64(&mut buf, self.size as u64);
        buf
    }

    /// Decodes a position previously produced by [`RecordPos::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        let mut rest = buf;
        let file_id = varint::decode_u64(&mut rest).ok_or(RecordError::Corrupt)?;
        let offset = varint::decode_u64(&mut rest).ok_or(RecordError::Corrupt)?;
        let size = varint::decode_u64(&mut rest).ok_or(RecordError::Corrupt)?;
        if file_id > u32::MAX as u64 || offset > u32::MAX as u64 || size > u32::MAX as u64 {
            return Err(RecordError::Corrupt);
        }
        Ok(Self {
            file_id: file_id as u32,
            offset: offset as u32,
            size: size as u32,
        })
    }
}

/// Parsed record header, before the key and value bytes are read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    pub rec_type: RecordType,
    pub crc: u32,
    pub key_size: usize,
    pub value_size: usize,
}

/// Encodes `rec` into its on-disk form, returning the bytes and their length.
pub fn encode_record(rec: &LogRecord) -> (Vec<u8>, usize) {
    let mut buf = Vec::with_capacity(MAX_HEADER_LEN + rec.key.len() + rec.value.len());
    buf.extend_from_slice(&[0u8; CRC_LEN]);
    buf.push(rec.rec_type as u8);
    varint::encode_i64(&mut buf, rec.key.len() as i64);
    varint::encode_i64(&mut buf, rec.value.len() as i64);
    buf.extend_from_slice(&rec.key);
    buf.extend_from_slice(&rec.value);

    let crc = crc32fast::hash(&buf[CRC_LEN..]);
    LittleEndian::write_u32(&mut buf[..CRC_LEN], crc);

    let len = buf.len();
    (buf, len)
}

/// Decodes a record header from `buf` (up to [`MAX_HEADER_LEN`] bytes read at
/// the record offset).
///
/// Returns `Ok(None)` for the end-of-file shapes: a buffer shorter than five
/// bytes, a header truncated mid-varint, or a zero CRC with a zero key size
/// (zero padding at the tail of a mapped file).
pub(crate) fn decode_header(buf: &[u8]) -> Result<Option<(RecordHeader, usize)>, RecordError> {
    if buf.len() < CRC_LEN + 1 {
        return Ok(None);
    }
    let crc = LittleEndian::read_u32(&buf[..CRC_LEN]);
    let rec_type = RecordType::from_u8(buf[CRC_LEN])?;

    let mut rest = &buf[CRC_LEN + 1..];
    let before = rest.len();
    let key_size = match varint::decode_i64(&mut rest) {
        Some(v) => v,
        None => return Ok(None),
    };
    let value_size = match varint::decode_i64(&mut rest) {
        Some(v) => v,
        None => return Ok(None),
    };
    let header_len = CRC_LEN + 1 + (before - rest.len());

    if crc == 0 && key_size == 0 {
        return Ok(None);
    }
    if key_size < 0 || value_size < 0 {
        return Err(RecordError::Corrupt);
    }

    Ok(Some((
        RecordHeader {
            rec_type,
            crc,
            key_size: key_size as usize,
            value_size: value_size as usize,
        },
        header_len,
    )))
}
