//! Read path: `get()` and position-based record resolution.
//!
//! A lookup is one index probe plus one positional read: the active file of
//! the owning shard if the ids match, otherwise the shared sealed map.

use logfile::{DataFile, LogRecord, RecordPos, RecordType};

use crate::{Engine, KvError, Result};

impl Engine {
    /// Looks up the live value for `key`.
    ///
    /// Returns [`KvError::KeyNotFound`] when the key is absent or its newest
    /// record is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(KvError::KeyIsEmpty);
        }

        let shard = self.shard_of(key);
        let guard = self.shards[shard].read();

        let pos = self.index.get(key)?.ok_or(KvError::KeyNotFound)?;
        self.value_by_position(guard.active.as_ref(), &pos)
    }

    /// Reads the record at `pos` and returns its value, treating tombstones
    /// as absent. `active` is the caller's shard active file, if it holds
    /// that shard's lock.
    pub(crate) fn value_by_position(
        &self,
        active: Option<&DataFile>,
        pos: &RecordPos,
    ) -> Result<Vec<u8>> {
        let record = self.record_by_position(active, pos)?;
        if record.rec_type == RecordType::Deleted {
            return Err(KvError::KeyNotFound);
        }
        Ok(record.value)
    }

    fn record_by_position(&self, active: Option<&DataFile>, pos: &RecordPos) -> Result<LogRecord> {
        if let Some(file) = active {
            if file.file_id() == pos.file_id {
                return match file.read_record(pos.offset)? {
                    Some((record, _)) => Ok(record),
                    None => Err(KvError::DataDirectoryCorrupted),
                };
            }
        }

        let file = self
            .sealed
            .read()
            .get(&pos.file_id)
            .cloned()
            .ok_or(KvError::DataFileNotFound)?;
        match file.read_record(pos.offset)? {
            Some((record, _)) => Ok(record),
            None => Err(KvError::DataDirectoryCorrupted),
        }
    }
}
