//! Write path: `put()`, `delete()`, and the shared append machinery.
//!
//! Every mutation is stamped with a fresh sequence number, framed as a log
//! record, and appended to the active file of the shard owning its key. The
//! on-disk key is `varuint(seq) ‖ user_key`, so recovery can order writes and
//! match batch records to their terminator.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use logfile::record::encode_record;
use logfile::varint;
use logfile::{DataFile, IoType, LogRecord, RecordPos, RecordType};
use tracing::debug;

use crate::{Engine, KvError, Result, Shard};

/// Prepends the sequence number to a user key, forming the on-disk key.
pub(crate) fn wrap_key(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut wrapped = Vec::with_capacity(varint::MAX_VARINT_LEN + key.len());
    varint::encode_u64(&mut wrapped, seq_no);
    wrapped.extend_from_slice(key);
    wrapped
}

/// Splits an on-disk key back into its sequence number and user key.
pub(crate) fn parse_wrapped_key(wrapped: &[u8]) -> Result<(u64, &[u8])> {
    let mut rest = wrapped;
    let seq_no = varint::decode_u64(&mut rest).ok_or(KvError::DataDirectoryCorrupted)?;
    Ok((seq_no, rest))
}

impl Engine {
    /// Writes a key/value pair. The key must be non-empty; the value may be
    /// empty.
    ///
    /// The record is written with type `TxnFinished` so it self-commits:
    /// recovery applies it without waiting for a batch terminator.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::KeyIsEmpty);
        }

        let seq_no = self.seq_no.fetch_add(1, Ordering::SeqCst) + 1;
        let record = LogRecord {
            key: wrap_key(key, seq_no),
            value: value.to_vec(),
            rec_type: RecordType::TxnFinished,
        };

        let shard = self.shard_of(key);
        let pos = {
            let mut guard = self.shards[shard].write();
            self.append_locked(&mut guard, &record)?
        };

        if let Some(old) = self.index.put(key, pos)? {
            self.reclaim_add(old.size as u64);
        }
        Ok(())
    }

    /// Deletes a key by appending a tombstone. Deleting a key that is not
    /// live is a no-op.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::KeyIsEmpty);
        }
        if self.index.get(key)?.is_none() {
            return Ok(());
        }

        let seq_no = self.seq_no.fetch_add(1, Ordering::SeqCst) + 1;
        let record = LogRecord {
            key: wrap_key(key, seq_no),
            value: Vec::new(),
            rec_type: RecordType::Deleted,
        };

        let shard = self.shard_of(key);
        let pos = {
            let mut guard = self.shards[shard].write();
            self.append_locked(&mut guard, &record)?
        };

        // The tombstone itself is dead weight as soon as it has been applied.
        self.reclaim_add(pos.size as u64);

        let (old, existed) = self.index.delete(key)?;
        if !existed {
            return Err(KvError::IndexUpdateFailed);
        }
        if let Some(old) = old {
            self.reclaim_add(old.size as u64);
        }
        Ok(())
    }

    /// Appends `record` to the shard's active file. The caller must hold the
    /// shard's write lock.
    ///
    /// Opens an active file on first use, rotates when the record would push
    /// the file past `data_file_size` (the record then lands entirely in the
    /// new file), and applies the `sync_writes` / `bytes_per_sync` policy.
    pub(crate) fn append_locked(&self, shard: &mut Shard, record: &LogRecord) -> Result<RecordPos> {
        let (encoded, size) = encode_record(record);

        if shard.active.is_none() {
            shard.active = Some(self.new_active_file()?);
        }
        if shard
            .active
            .as_ref()
            .is_some_and(|file| file.write_off() as u64 + size as u64 > self.options.data_file_size as u64)
        {
            if let Some(full) = shard.active.take() {
                full.sync()?;
                debug!(file_id = full.file_id(), "sealed data file");
                self.sealed.write().insert(full.file_id(), Arc::new(full));
            }
            shard.active = Some(self.new_active_file()?);
        }
        let active = shard.active.as_mut().ok_or(KvError::DataFileNotFound)?;

        let offset = active.write_off();
        active.write(&encoded)?;

        self.bytes_written.fetch_add(size as u64, Ordering::Relaxed);
        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0
                && self.bytes_written.load(Ordering::Relaxed) >= self.options.bytes_per_sync);
        if need_sync {
            active.sync()?;
            self.bytes_written.store(0, Ordering::Relaxed);
        }

        Ok(RecordPos {
            file_id: active.file_id(),
            offset,
            size: size as u32,
        })
    }

    /// Opens a fresh active file with a globally unique id.
    fn new_active_file(&self) -> Result<DataFile> {
        let file_id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        let file = DataFile::open(&self.options.dir_path, file_id, IoType::Standard)?;
        Ok(file)
    }
}
