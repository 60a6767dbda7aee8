//! Atomic multi-key write batches.
//!
//! A batch buffers mutations in memory, collapsing repeated writes to one
//! key down to the last one. `commit` appends every buffered record under
//! one shared sequence number, then appends a `TxnFinished` terminator whose
//! value is the big-endian entry count. Recovery only applies a batch whose
//! terminator matches its record count, so a crash mid-commit leaves nothing
//! visible.
//!
//! Shard locks are taken in ascending shard order and released in reverse,
//! which keeps concurrent batches over overlapping shard sets deadlock-free.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::Ordering;

use byteorder::{BigEndian, ByteOrder};
use logfile::{LogRecord, RecordPos, RecordType};
use parking_lot::Mutex;

use crate::write::wrap_key;
use crate::{Engine, IndexType, KvError, Result, WriteBatchOptions};

/// Reserved user key carried by batch terminator records.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

struct PendingWrite {
    rec_type: RecordType,
    value: Vec<u8>,
}

/// An atomic batch of writes against one engine.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    pending: Mutex<HashMap<Vec<u8>, PendingWrite>>,
}

impl Engine {
    /// Creates an empty write batch.
    ///
    /// With the on-disk B+ tree index the batch sequence numbers must survive
    /// restarts; an existing database without a persisted sequence number
    /// cannot guarantee that, so batch creation is refused.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        if self.options.index_type == IndexType::BPlusTree
            && !self.seq_no_file_exists
            && !self.is_initial
        {
            return Err(KvError::OptionsInvalid(
                "write batch requires a persisted sequence number with the on-disk index"
                    .to_string(),
            ));
        }
        Ok(WriteBatch {
            engine: self,
            options,
            pending: Mutex::new(HashMap::new()),
        })
    }
}

impl WriteBatch<'_> {
    /// Buffers a write. Nothing reaches disk until [`commit`](Self::commit).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::KeyIsEmpty);
        }
        self.pending.lock().insert(
            key.to_vec(),
            PendingWrite {
                rec_type: RecordType::Normal,
                value: value.to_vec(),
            },
        );
        Ok(())
    }

    /// Buffers a delete. Deleting a key that is neither live nor pending is
    /// a no-op, and cancels a pending put of the same key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::KeyIsEmpty);
        }
        let mut pending = self.pending.lock();
        if self.engine.index.get(key)?.is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(
            key.to_vec(),
            PendingWrite {
                rec_type: RecordType::Deleted,
                value: Vec::new(),
            },
        );
        Ok(())
    }

    /// Commits the batch: all buffered mutations become visible together, or
    /// not at all if the process dies before the terminator reaches disk.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_size {
            return Err(KvError::BatchTooLarge);
        }

        // Lock every touched shard in ascending order.
        let touched: BTreeSet<usize> = pending
            .keys()
            .map(|key| self.engine.shard_of(key))
            .collect();
        let mut guards: Vec<(usize, _)> = touched
            .iter()
            .map(|&shard| (shard, self.engine.shards[shard].write()))
            .collect();

        // All records in this batch share one sequence number.
        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut applied: Vec<(Vec<u8>, RecordType, RecordPos)> = Vec::with_capacity(pending.len());
        for (key, write) in pending.iter() {
            let shard = self.engine.shard_of(key);
            let record = LogRecord {
                key: wrap_key(key, seq_no),
                value: write.value.clone(),
                rec_type: write.rec_type,
            };
            let slot = guards
                .iter_mut()
                .find(|(owner, _)| *owner == shard)
                .ok_or(KvError::IndexUpdateFailed)?;
            let pos = self.engine.append_locked(&mut slot.1, &record)?;
            applied.push((key.clone(), write.rec_type, pos));
        }

        // The terminator goes to the shard whose active file has the largest
        // id. Placement does not matter for correctness; recovery matches by
        // sequence number.
        let mut fin_slot = 0usize;
        let mut max_file_id = 0u32;
        for (i, (_, guard)) in guards.iter().enumerate() {
            if let Some(active) = &guard.active {
                if active.file_id() >= max_file_id {
                    max_file_id = active.file_id();
                    fin_slot = i;
                }
            }
        }
        let mut count = [0u8; 8];
        BigEndian::write_u64(&mut count, applied.len() as u64);
        let terminator = LogRecord {
            key: wrap_key(TXN_FIN_KEY, seq_no),
            value: count.to_vec(),
            rec_type: RecordType::TxnFinished,
        };
        self.engine
            .append_locked(&mut guards[fin_slot].1, &terminator)?;

        if self.options.sync_writes {
            for (_, guard) in &guards {
                if let Some(active) = &guard.active {
                    active.sync()?;
                }
            }
        }

        // Everything is on disk; apply to the index in append order.
        for (key, rec_type, pos) in &applied {
            let old = match rec_type {
                RecordType::Deleted => self.engine.index.delete(key)?.0,
                _ => self.engine.index.put(key, *pos)?,
            };
            if let Some(old) = old {
                self.engine.reclaim_add(old.size as u64);
            }
        }

        pending.clear();

        // Release shard locks in reverse acquisition order.
        while guards.pop().is_some() {}
        Ok(())
    }
}
