//! Merge: compaction of dead records, hint-file generation, and adoption of
//! merge output on the next open.
//!
//! Merge rewrites only live records into a scratch store rooted at the
//! `<dir>-merge` sibling directory, writing a hint record for each so the
//! next open can rebuild the index without scanning the merged segments. The
//! `merge-finished` marker is written last; recovery refuses to adopt a merge
//! directory that lacks it.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use logfile::record::encode_record;
use logfile::{
    DataFile, LogRecord, RecordPos, RecordType, DATA_FILE_SUFFIX, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use tracing::info;

use crate::write::{parse_wrapped_key, wrap_key};
use crate::{fsutil, Engine, IndexType, KvError, Result, FILE_LOCK_NAME};

const MERGE_DIR_SUFFIX: &str = "-merge";
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Sibling directory a merge writes into: `<dir>-merge`.
pub(crate) fn merge_path(dir: &Path) -> PathBuf {
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    let mut name = dir.file_name().map(OsString::from).unwrap_or_default();
    name.push(MERGE_DIR_SUFFIX);
    parent.join(name)
}

impl Engine {
    /// Compacts the database, dropping overwritten and deleted records.
    ///
    /// # Preconditions
    ///
    /// * no merge already running,
    /// * `reclaimable / total ≥ data_file_merge_ratio`,
    /// * enough free disk space for the surviving data.
    ///
    /// Writes continue during the merge; only files sealed before the
    /// snapshot participate. The output is adopted atomically on the next
    /// [`Engine::open`].
    pub fn merge(&self) -> Result<()> {
        if self
            .merging
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KvError::MergeInProgress);
        }
        let result = self.merge_inner();
        self.merging.store(false, Ordering::SeqCst);
        result
    }

    fn merge_inner(&self) -> Result<()> {
        let mut merge_ids: Vec<u32> = {
            let mut guards: Vec<_> = self.shards.iter().map(|shard| shard.write()).collect();

            let total_size = fsutil::dir_size(&self.options.dir_path)?;
            let reclaimable = self.reclaim_size.load(Ordering::Relaxed);
            if (reclaimable as f32) < self.options.data_file_merge_ratio * (total_size as f32) {
                return Err(KvError::MergeRatioUnreached);
            }
            let available = fsutil::available_disk_size(&self.options.dir_path)?;
            if total_size.saturating_sub(reclaimable) >= available {
                return Err(KvError::NoSpaceForMerge);
            }

            // Seal every active file. Merge then works on a frozen set of
            // ids while writes continue into fresh files.
            let mut sealed = self.sealed.write();
            for guard in guards.iter_mut() {
                if let Some(active) = guard.active.take() {
                    active.sync()?;
                    sealed.insert(active.file_id(), Arc::new(active));
                }
            }
            sealed.keys().copied().collect()
        };
        if merge_ids.is_empty() {
            return Ok(());
        }
        merge_ids.sort_unstable();
        let non_merge_file_id = merge_ids.last().copied().map_or(0, |max| max + 1);

        info!(
            files = merge_ids.len(),
            non_merge_file_id, "merge started"
        );

        let merge_dir = merge_path(&self.options.dir_path);
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        let mut merge_options = self.options.clone();
        merge_options.dir_path = merge_dir.clone();
        merge_options.sync_writes = false;
        // The scratch store only appends; its index is never consulted.
        merge_options.index_type = IndexType::BTree;
        let merge_engine = Engine::open(merge_options)?;

        let mut hint_file = DataFile::open_hint_file(&merge_dir)?;

        for &file_id in &merge_ids {
            let file = self
                .sealed
                .read()
                .get(&file_id)
                .cloned()
                .ok_or(KvError::DataFileNotFound)?;
            let mut offset = 0u32;
            while let Some((record, size)) = file.read_record(offset)? {
                let (_, user_key) = parse_wrapped_key(&record.key)?;
                // A record is live iff the index still points at this exact
                // spot. Tombstones and overwritten records fail the check
                // and are dropped.
                if let Some(pos) = self.index.get(user_key)? {
                    if pos.file_id == file_id && pos.offset == offset {
                        let rewritten = LogRecord {
                            key: wrap_key(user_key, 0),
                            value: record.value,
                            rec_type: RecordType::TxnFinished,
                        };
                        let new_pos = {
                            let mut guard = merge_engine.shards[0].write();
                            merge_engine.append_locked(&mut guard, &rewritten)?
                        };
                        hint_file.write_hint_record(user_key, &new_pos)?;
                    }
                }
                offset += size;
            }
        }

        hint_file.sync()?;
        merge_engine.sync_all()?;
        merge_engine.close()?;

        // The marker goes last: its presence is what makes this directory
        // adoptable. Its value is the first file id the merge did not cover.
        let mut fin_file = DataFile::open_merge_finished_file(&merge_dir)?;
        let (bytes, _) = encode_record(&LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: non_merge_file_id.to_string().into_bytes(),
            rec_type: RecordType::Normal,
        });
        fin_file.write(&bytes)?;
        fin_file.sync()?;

        self.reclaim_size.store(0, Ordering::Relaxed);
        info!("merge finished");
        Ok(())
    }

    /// Adopts a completed merge found in the `-merge` sibling directory:
    /// deletes the superseded primary segments, moves the merge output in,
    /// and removes the merge directory. An unfinished merge is discarded.
    pub(crate) fn load_merge_files(&self) -> Result<()> {
        let merge_dir = merge_path(&self.options.dir_path);
        if !merge_dir.exists() {
            return Ok(());
        }

        let mut merge_finished = false;
        let mut file_names: Vec<OsString> = Vec::new();
        for entry in fs::read_dir(&merge_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name == MERGE_FINISHED_FILE_NAME {
                merge_finished = true;
            }
            // Scratch-store bookkeeping stays behind: the lock file, the
            // persisted counters, and the scratch index directory.
            if name == FILE_LOCK_NAME
                || name == SEQ_NO_FILE_NAME
                || name == logfile::NEXT_FILE_ID_FILE_NAME
                || name == index::BPTREE_DIR_NAME
            {
                continue;
            }
            file_names.push(name);
        }

        if !merge_finished {
            fs::remove_dir_all(&merge_dir)?;
            return Ok(());
        }

        let non_merge_file_id = self.non_merge_file_id(&merge_dir)?;

        // Drop the primary segments the merge superseded.
        for entry in fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) {
                let file_id: u32 = stem
                    .parse()
                    .map_err(|_| KvError::DataDirectoryCorrupted)?;
                if file_id < non_merge_file_id {
                    fs::remove_file(entry.path())?;
                }
            }
        }

        // Adopt the merge output.
        for name in file_names {
            fs::rename(merge_dir.join(&name), self.options.dir_path.join(&name))?;
        }
        fs::remove_dir_all(&merge_dir)?;
        info!(non_merge_file_id, "adopted merge output");
        Ok(())
    }

    /// Reads the first file id a completed merge did not cover from the
    /// `merge-finished` marker in `dir`.
    pub(crate) fn non_merge_file_id(&self, dir: &Path) -> Result<u32> {
        let file = DataFile::open_merge_finished_file(dir)?;
        let (record, _) = file
            .read_record(0)?
            .ok_or(KvError::DataDirectoryCorrupted)?;
        std::str::from_utf8(&record.value)
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or(KvError::DataDirectoryCorrupted)
    }

    /// Loads `(key → position)` entries from the hint file straight into the
    /// index, sparing the scan of merged segments.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        let path = self.options.dir_path.join(HINT_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }
        let file = DataFile::open_hint_file(&self.options.dir_path)?;
        let mut offset = 0u32;
        let mut entries = 0usize;
        while let Some((record, size)) = file.read_record(offset)? {
            let pos = RecordPos::decode(&record.value)?;
            self.index.put(&record.key, pos)?;
            offset += size;
            entries += 1;
        }
        info!(entries, "index loaded from hint file");
        Ok(())
    }
}
