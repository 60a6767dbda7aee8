//! Cold-start recovery: loading data files and rebuilding the index.
//!
//! The scan is transactional. Batch records are parked under their sequence
//! number until the matching `TxnFinished` terminator proves the batch
//! committed; orphaned records from a crashed commit are silently discarded.
//! Single-key writes self-commit (put records carry `TxnFinished`, delete
//! records apply immediately). A torn or corrupt tail truncates the scan of
//! that one file without failing the open.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use logfile::{
    DataFile, IoType, RecordError, RecordPos, RecordType, DATA_FILE_SUFFIX,
    NEXT_FILE_ID_FILE_NAME, SEQ_NO_FILE_NAME,
};
use tracing::{debug, warn};

use crate::batch::TXN_FIN_KEY;
use crate::write::parse_wrapped_key;
use crate::{Engine, KvError, Result};

impl Engine {
    /// Opens every `*.data` segment in the directory as sealed, returning the
    /// ascending list of file ids.
    pub(crate) fn load_data_files(&self) -> Result<Vec<u32>> {
        let mut file_ids = Vec::new();
        for entry in std::fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
                let file_id: u32 = stem
                    .parse()
                    .map_err(|_| KvError::DataDirectoryCorrupted)?;
                file_ids.push(file_id);
            }
        }
        file_ids.sort_unstable();

        let io_type = if self.options.mmap_at_startup {
            IoType::Mmap
        } else {
            IoType::Standard
        };
        let mut sealed = self.sealed.write();
        for &file_id in &file_ids {
            let file = DataFile::open(&self.options.dir_path, file_id, io_type)?;
            sealed.insert(file_id, Arc::new(file));
        }
        Ok(file_ids)
    }

    /// Rebuilds the index by scanning data files in ascending id order,
    /// skipping segments already covered by the hint file.
    pub(crate) fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }

        let mut non_merge_file_id = 0u32;
        let has_merged = self
            .options
            .dir_path
            .join(logfile::MERGE_FINISHED_FILE_NAME)
            .exists();
        if has_merged {
            non_merge_file_id = self.non_merge_file_id(&self.options.dir_path)?;
        }

        // Batch records parked until their terminator shows up.
        let mut pending: HashMap<u64, Vec<(RecordType, Vec<u8>, RecordPos)>> = HashMap::new();
        // Highest sequence number already applied per key, so an earlier
        // commit can never clobber a later one.
        let mut key_seen: HashMap<Vec<u8>, u64> = HashMap::new();
        let mut current_seq = 0u64;

        for &file_id in file_ids {
            if has_merged && file_id < non_merge_file_id {
                continue;
            }
            let file = self
                .sealed
                .read()
                .get(&file_id)
                .cloned()
                .ok_or(KvError::DataFileNotFound)?;

            let mut offset = 0u32;
            loop {
                let (record, size) = match file.read_record(offset) {
                    Ok(Some(parsed)) => parsed,
                    Ok(None) => break,
                    Err(RecordError::InvalidCrc) | Err(RecordError::Corrupt) => {
                        warn!(file_id, offset, "torn record, truncating scan of this file");
                        break;
                    }
                    Err(err) => return Err(err.into()),
                };
                let pos = RecordPos {
                    file_id,
                    offset,
                    size,
                };
                let (seq_no, user_key) = match parse_wrapped_key(&record.key) {
                    Ok(parsed) => parsed,
                    Err(_) => {
                        warn!(file_id, offset, "unparseable key, truncating scan of this file");
                        break;
                    }
                };

                if record.rec_type == RecordType::TxnFinished && user_key == TXN_FIN_KEY {
                    // Terminator: the batch committed iff every one of its
                    // records is accounted for.
                    if record.value.len() == 8 {
                        let count = BigEndian::read_u64(&record.value) as usize;
                        if pending.get(&seq_no).map_or(0, |records| records.len()) == count {
                            if let Some(records) = pending.remove(&seq_no) {
                                for (rec_type, key, rec_pos) in records {
                                    if key_seen.get(&key).is_some_and(|&seen| seen > seq_no) {
                                        continue;
                                    }
                                    self.update_index(rec_type, &key, &rec_pos)?;
                                    key_seen.insert(key, seq_no);
                                }
                            }
                        }
                    }
                } else if record.rec_type == RecordType::TxnFinished {
                    // Self-committed single-key write.
                    if !key_seen.get(user_key).is_some_and(|&seen| seen > seq_no) {
                        self.update_index(RecordType::Normal, user_key, &pos)?;
                        key_seen.insert(user_key.to_vec(), seq_no);
                    }
                } else {
                    pending
                        .entry(seq_no)
                        .or_default()
                        .push((record.rec_type, user_key.to_vec(), pos));
                    // The single-key delete path writes tombstones without a
                    // terminator; apply them right away.
                    if record.rec_type == RecordType::Deleted
                        && !key_seen.get(user_key).is_some_and(|&seen| seen > seq_no)
                    {
                        self.update_index(RecordType::Deleted, user_key, &pos)?;
                        key_seen.insert(user_key.to_vec(), seq_no);
                    }
                }

                current_seq = current_seq.max(seq_no);
                offset += size;
            }
        }

        self.seq_no.store(current_seq, Ordering::SeqCst);
        debug!(
            seq_no = current_seq,
            keys = self.index.size()?,
            "index rebuilt from data files"
        );
        Ok(())
    }

    fn update_index(&self, rec_type: RecordType, key: &[u8], pos: &RecordPos) -> Result<()> {
        let old = if rec_type == RecordType::Deleted {
            let (old, _) = self.index.delete(key)?;
            // An applied tombstone is itself dead weight.
            self.reclaim_add(pos.size as u64);
            old
        } else {
            self.index.put(key, *pos)?
        };
        if let Some(old) = old {
            self.reclaim_add(old.size as u64);
        }
        Ok(())
    }

    /// Loads the sequence number persisted at the last clean close. Only
    /// consulted with the on-disk B+ tree index, which skips the data scan.
    pub(crate) fn load_seq_no(&mut self) -> Result<()> {
        let path = self.options.dir_path.join(SEQ_NO_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }
        let file = DataFile::open_seq_no_file(&self.options.dir_path)?;
        let (record, _) = file
            .read_record(0)?
            .ok_or(KvError::DataDirectoryCorrupted)?;
        let seq_no = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or(KvError::DataDirectoryCorrupted)?;
        self.seq_no.store(seq_no, Ordering::SeqCst);
        self.seq_no_file_exists = true;
        Ok(())
    }

    /// Loads the persisted file-id counter, deriving it from the largest
    /// existing segment id when the file is missing or stale. Ids must never
    /// be reused within a directory.
    pub(crate) fn load_next_file_id(&self, file_ids: &[u32]) -> Result<()> {
        let derived = file_ids.iter().max().map_or(0, |&max| max + 1);

        let path = self.options.dir_path.join(NEXT_FILE_ID_FILE_NAME);
        let next = if path.exists() {
            let file = DataFile::open_next_file_id_file(&self.options.dir_path)?;
            let (record, _) = file
                .read_record(0)?
                .ok_or(KvError::DataDirectoryCorrupted)?;
            let persisted = std::str::from_utf8(&record.value)
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .ok_or(KvError::DataDirectoryCorrupted)?;
            persisted.max(derived)
        } else {
            derived
        };
        self.next_file_id.store(next, Ordering::SeqCst);
        Ok(())
    }
}
