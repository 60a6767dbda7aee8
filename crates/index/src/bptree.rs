//! On-disk B+ tree index backed by LMDB (via `heed`).
//!
//! Chosen when the caller wants to reopen a database without rescanning its
//! data files: the key directory itself is persisted, at the cost of a write
//! transaction per index update.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use logfile::RecordPos;

use crate::{IndexError, IndexIterator};

/// Directory inside the database dir holding the LMDB environment.
pub const BPTREE_DIR_NAME: &str = "bptree-index";

const MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Persistent key directory: `key → encoded RecordPos`.
pub struct BPlusTreeIndex {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl BPlusTreeIndex {
    /// Opens (or creates) the on-disk index under `dir/bptree-index`.
    pub fn new(dir: &Path) -> Result<Self, IndexError> {
        let path = dir.join(BPTREE_DIR_NAME);
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(1)
                .open(&path)?
        };
        let db = {
            let mut wtxn = env.write_txn()?;
            let db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some("keydir"))?;
            wtxn.commit()?;
            db
        };
        Ok(Self { env, db })
    }

    pub fn put(&self, key: &[u8], pos: RecordPos) -> Result<Option<RecordPos>, IndexError> {
        let mut wtxn = self.env.write_txn()?;
        let old = match self.db.get(&wtxn, key)? {
            Some(bytes) => Some(RecordPos::decode(bytes).map_err(|_| IndexError::Corrupt)?),
            None => None,
        };
        self.db.put(&mut wtxn, key, &pos.encode())?;
        wtxn.commit()?;
        Ok(old)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<RecordPos>, IndexError> {
        let rtxn = self.env.read_txn()?;
        match self.db.get(&rtxn, key)? {
            Some(bytes) => Ok(Some(
                RecordPos::decode(bytes).map_err(|_| IndexError::Corrupt)?,
            )),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &[u8]) -> Result<(Option<RecordPos>, bool), IndexError> {
        let mut wtxn = self.env.write_txn()?;
        let old = match self.db.get(&wtxn, key)? {
            Some(bytes) => Some(RecordPos::decode(bytes).map_err(|_| IndexError::Corrupt)?),
            None => None,
        };
        let existed = self.db.delete(&mut wtxn, key)?;
        wtxn.commit()?;
        Ok((old, existed))
    }

    pub fn size(&self) -> Result<usize, IndexError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)? as usize)
    }

    pub fn iterator(&self, reverse: bool) -> Result<IndexIterator, IndexError> {
        let rtxn = self.env.read_txn()?;
        let mut items = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (key, value) = entry?;
            let pos = RecordPos::decode(value).map_err(|_| IndexError::Corrupt)?;
            items.push((key.to_vec(), pos));
        }
        Ok(IndexIterator::new(items, reverse))
    }

    /// Forces the environment to durable storage.
    pub fn close(&self) -> Result<(), IndexError> {
        self.env.force_sync()?;
        Ok(())
    }
}
