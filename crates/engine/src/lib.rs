//! # engine — the LodeKV storage engine
//!
//! A Bitcask-model key/value store: every mutation is appended to a numbered
//! data segment, and an in-memory index maps each live key to the location of
//! its newest record. Point reads cost at most one disk seek.
//!
//! ## Architecture
//!
//! ```text
//! put/delete/batch
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ shard = fnv1a(key) % slots                    │
//! │   |                                           │
//! │   v                                           │
//! │ shards[shard] ── append ──> active data file  │
//! │   |                 (rotate at DataFileSize)  │
//! │   v                                           │
//! │ index.put(key, {file_id, offset, size})       │
//! │                                               │
//! │ get: index.get ──> active file or sealed map  │
//! │ merge: rewrite live records + hint file       │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `lib.rs`     | `Engine` struct, open/close, stats, backup, fold     |
//! | [`write`]    | `put()`, `delete()`, the shared append path          |
//! | [`read`]     | `get()` and position-based record reads              |
//! | [`batch`]    | atomic multi-key batches with a terminator record    |
//! | [`recovery`] | data-file scan, transactional index rebuild          |
//! | [`merge`]    | compaction into a sibling directory + hint file      |
//! | [`iterator`] | public prefix/reverse iterator over live keys        |
//!
//! ## Crash safety
//!
//! Records carry a CRC and a sequence number. A batch only becomes visible
//! once its terminator record is on disk; recovery discards orphaned batch
//! records and truncates torn tails. The `merge-finished` marker is written
//! last so a crashed merge is simply ignored on the next open.

pub mod batch;
mod error;
mod fsutil;
mod iterator;
mod merge;
mod options;
mod read;
mod recovery;
mod write;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use logfile::record::encode_record;
use logfile::{DataFile, LogRecord, RecordType, NEXT_FILE_ID_FILE_NAME, SEQ_NO_FILE_NAME};
use parking_lot::RwLock;
use tracing::info;

pub use batch::WriteBatch;
pub use error::{KvError, Result};
pub use iterator::EngineIterator;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};

/// Name of the process lock file inside the database directory.
pub const FILE_LOCK_NAME: &str = "flock";

/// One independent append stream. The shard lock guards the active file and
/// its write offset; sealed files live in the shared map.
pub(crate) struct Shard {
    pub(crate) active: Option<DataFile>,
}

/// Engine statistics, as returned by [`Engine::stat`].
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    /// Number of live keys.
    pub key_num: usize,
    /// Number of data files (sealed plus active).
    pub data_file_num: usize,
    /// Bytes a full merge could reclaim.
    pub reclaimable_size: u64,
    /// Total bytes occupied by the database directory.
    pub disk_size: u64,
}

/// The storage engine. All public operations take `&self` and are safe to
/// call from multiple threads.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) shards: Vec<RwLock<Shard>>,
    /// Sealed (read-only) data files, shared across shards, keyed by file id.
    pub(crate) sealed: RwLock<HashMap<u32, Arc<DataFile>>>,
    pub(crate) index: index::Indexer,

    /// Transaction sequence number, globally increasing.
    pub(crate) seq_no: AtomicU64,
    /// Next data-file id to hand out; never reused within a directory.
    pub(crate) next_file_id: AtomicU32,
    /// Bytes appended since the last sync, for the `bytes_per_sync` policy.
    pub(crate) bytes_written: AtomicU64,
    /// Bytes made dead by overwrites and deletes; reset by merge.
    pub(crate) reclaim_size: AtomicU64,
    pub(crate) merging: AtomicBool,

    pub(crate) seq_no_file_exists: bool,
    pub(crate) is_initial: bool,
    closed: AtomicBool,
    lock_file: File,
}

impl Engine {
    /// Opens a database directory, acquiring its process lock and rebuilding
    /// the index.
    ///
    /// # Recovery steps
    ///
    /// 1. Validate options, create the directory if missing.
    /// 2. Take an exclusive lock on `flock`; a held lock means another
    ///    process owns the directory.
    /// 3. Adopt a completed merge from the `-merge` sibling directory.
    /// 4. Open every `*.data` segment as sealed.
    /// 5. Rebuild the index: hint file first, then a transactional scan of
    ///    the remaining segments (skipped entirely for the on-disk B+ tree).
    /// 6. Load the persisted file-id counter, or derive it from the largest
    ///    segment id.
    pub fn open(options: Options) -> Result<Self> {
        options.validate()?;
        let dir = options.dir_path.clone();

        let mut is_initial = false;
        if !dir.exists() {
            is_initial = true;
            fs::create_dir_all(&dir)?;
        }
        if fs::read_dir(&dir)?.next().is_none() {
            is_initial = true;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join(FILE_LOCK_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| KvError::DatabaseInUse)?;

        let index = index::Indexer::new(options.index_type, &dir)?;
        let shards = (0..options.slots)
            .map(|_| RwLock::new(Shard { active: None }))
            .collect();

        let mut engine = Engine {
            options,
            shards,
            sealed: RwLock::new(HashMap::new()),
            index,
            seq_no: AtomicU64::new(0),
            next_file_id: AtomicU32::new(0),
            bytes_written: AtomicU64::new(0),
            reclaim_size: AtomicU64::new(0),
            merging: AtomicBool::new(false),
            seq_no_file_exists: false,
            is_initial,
            // Flipped to false only once recovery succeeds, so a failed open
            // never writes bookkeeping files into the directory on drop.
            closed: AtomicBool::new(true),
            lock_file,
        };

        engine.load_merge_files()?;
        let file_ids = engine.load_data_files()?;

        if engine.options.index_type != IndexType::BPlusTree {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files(&file_ids)?;
        } else {
            engine.load_seq_no()?;
        }

        // Mapped files were only for the startup scan; serve reads through
        // standard file I/O from here on.
        if engine.options.mmap_at_startup {
            engine.reset_sealed_io(&file_ids)?;
        }

        engine.load_next_file_id(&file_ids)?;
        engine.closed.store(false, Ordering::SeqCst);

        info!(
            dir = %engine.options.dir_path.display(),
            slots = engine.options.slots,
            data_files = file_ids.len(),
            seq_no = engine.seq_no.load(Ordering::SeqCst),
            "database opened"
        );
        Ok(engine)
    }

    /// Closes the database: persists the sequence number and file-id counter,
    /// syncs every active file, closes the index, and releases the directory
    /// lock. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();

        self.index.close()?;

        let dir = &self.options.dir_path;
        self.write_meta_file(dir, SEQ_NO_FILE_NAME, self.seq_no.load(Ordering::SeqCst))?;
        self.write_meta_file(
            dir,
            NEXT_FILE_ID_FILE_NAME,
            self.next_file_id.load(Ordering::SeqCst) as u64,
        )?;

        for guard in &guards {
            if let Some(active) = &guard.active {
                active.sync()?;
            }
        }

        self.lock_file.unlock()?;
        info!("database closed");
        Ok(())
    }

    /// Writes a single-record bookkeeping file holding `value` in decimal.
    fn write_meta_file(&self, dir: &Path, name: &str, value: u64) -> Result<()> {
        // These files hold exactly one record; rewrite from scratch.
        let path = dir.join(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let mut file = if name == SEQ_NO_FILE_NAME {
            DataFile::open_seq_no_file(dir)?
        } else {
            DataFile::open_next_file_id_file(dir)?
        };
        let (bytes, _) = encode_record(&LogRecord {
            key: name.as_bytes().to_vec(),
            value: value.to_string().into_bytes(),
            rec_type: RecordType::Normal,
        });
        file.write(&bytes)?;
        file.sync()?;
        Ok(())
    }

    /// Fsyncs every shard's active file.
    pub fn sync_all(&self) -> Result<()> {
        let guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();
        for guard in &guards {
            if let Some(active) = &guard.active {
                active.sync()?;
            }
        }
        Ok(())
    }

    /// Returns engine statistics.
    pub fn stat(&self) -> Result<Stat> {
        let guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();
        let active_num = guards
            .iter()
            .filter(|guard| guard.active.is_some())
            .count();
        let data_file_num = self.sealed.read().len() + active_num;
        Ok(Stat {
            key_num: self.index.size()?,
            data_file_num,
            reclaimable_size: self.reclaim_size.load(Ordering::Relaxed),
            disk_size: fsutil::dir_size(&self.options.dir_path)?,
        })
    }

    /// Copies the database directory into `dir`, excluding the lock file.
    pub fn backup(&self, dir: &Path) -> Result<()> {
        let _guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();
        fsutil::copy_dir(&self.options.dir_path, dir, &[FILE_LOCK_NAME])?;
        Ok(())
    }

    /// Returns a snapshot of every live key in ascending order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut it = self.index.iterator(false)?;
        let mut keys = Vec::with_capacity(self.index.size()?);
        while it.valid() {
            keys.push(it.key().to_vec());
            it.next();
        }
        it.close();
        Ok(keys)
    }

    /// Visits every live `(key, value)` pair in ascending key order, stopping
    /// early when `f` returns false.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> bool,
    {
        let guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();
        let mut it = self.index.iterator(false)?;
        while it.valid() {
            let key = it.key();
            let pos = it.value();
            let shard = self.shard_of(key);
            let value = self.value_by_position(guards[shard].active.as_ref(), &pos)?;
            if !f(key, value) {
                break;
            }
            it.next();
        }
        it.close();
        Ok(())
    }

    /// Shard owning `key`.
    pub(crate) fn shard_of(&self, key: &[u8]) -> usize {
        (fnv1a_64(key) % self.options.slots as u64) as usize
    }

    fn reset_sealed_io(&self, file_ids: &[u32]) -> Result<()> {
        let mut sealed = self.sealed.write();
        for &file_id in file_ids {
            let file = DataFile::open(&self.options.dir_path, file_id, logfile::IoType::Standard)?;
            sealed.insert(file_id, Arc::new(file));
        }
        Ok(())
    }

    pub(crate) fn reclaim_add(&self, bytes: u64) {
        self.reclaim_size.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Current reclaimable byte count.
    pub fn reclaim_size(&self) -> u64 {
        self.reclaim_size.load(Ordering::Relaxed)
    }

    /// Current sequence number.
    pub fn seq_no(&self) -> u64 {
        self.seq_no.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.options.dir_path)
            .field("slots", &self.options.slots)
            .field("seq_no", &self.seq_no.load(Ordering::SeqCst))
            .field("next_file_id", &self.next_file_id.load(Ordering::SeqCst))
            .field("reclaim_size", &self.reclaim_size.load(Ordering::Relaxed))
            .finish()
    }
}

/// Best-effort close on drop so a scoped engine still persists its counters.
/// Errors are ignored; the next open rebuilds anything missing from the log.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
