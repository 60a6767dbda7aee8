//! # index — the in-memory key directory
//!
//! Maps each live user key to the [`RecordPos`] of its newest record. One
//! abstraction, three interchangeable implementations selected at open time:
//!
//! | Variant     | Backing                      | Trade-off                        |
//! |-------------|------------------------------|----------------------------------|
//! | `BTree`     | `std::collections::BTreeMap` | simple, ordered iteration        |
//! | `Art`       | adaptive radix tree          | lower memory on shared prefixes  |
//! | `BPlusTree` | LMDB via `heed`              | survives restart without a scan  |
//!
//! The three share no state and are chosen once, so the selector is a tagged
//! enum rather than trait objects. Every variant hands out the same
//! [`IndexIterator`]: a point-in-time snapshot with `rewind`/`seek`/`next`.

mod art;
mod bptree;
mod btree;
mod iterator;

use std::path::Path;

use logfile::RecordPos;
use thiserror::Error;

pub use art::ArtIndex;
pub use bptree::{BPlusTreeIndex, BPTREE_DIR_NAME};
pub use btree::BTreeIndex;
pub use iterator::IndexIterator;

/// Errors from the index layer. The in-memory variants are infallible; every
/// error here originates in the on-disk B+ tree.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("on-disk index error: {0}")]
    Backend(#[from] heed::Error),

    #[error("corrupt index entry")]
    Corrupt,
}

/// Which index implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory ordered B-tree.
    BTree,
    /// In-memory adaptive radix tree.
    Art,
    /// On-disk B+ tree; recovery skips the data-file scan.
    BPlusTree,
}

/// The key directory, dispatching to the selected implementation.
pub enum Indexer {
    BTree(BTreeIndex),
    Art(ArtIndex),
    BPlusTree(BPlusTreeIndex),
}

impl Indexer {
    /// Creates the index of the given type. `dir` is only touched by the
    /// on-disk variant.
    pub fn new(index_type: IndexType, dir: &Path) -> Result<Self, IndexError> {
        Ok(match index_type {
            IndexType::BTree => Indexer::BTree(BTreeIndex::new()),
            IndexType::Art => Indexer::Art(ArtIndex::new()),
            IndexType::BPlusTree => Indexer::BPlusTree(BPlusTreeIndex::new(dir)?),
        })
    }

    /// Inserts or replaces the position for `key`, returning the displaced
    /// position if any.
    pub fn put(&self, key: &[u8], pos: RecordPos) -> Result<Option<RecordPos>, IndexError> {
        match self {
            Indexer::BTree(idx) => Ok(idx.put(key, pos)),
            Indexer::Art(idx) => Ok(idx.put(key, pos)),
            Indexer::BPlusTree(idx) => idx.put(key, pos),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<RecordPos>, IndexError> {
        match self {
            Indexer::BTree(idx) => Ok(idx.get(key)),
            Indexer::Art(idx) => Ok(idx.get(key)),
            Indexer::BPlusTree(idx) => idx.get(key),
        }
    }

    /// Removes `key`, returning the displaced position and whether the key
    /// was present.
    pub fn delete(&self, key: &[u8]) -> Result<(Option<RecordPos>, bool), IndexError> {
        match self {
            Indexer::BTree(idx) => Ok(idx.delete(key)),
            Indexer::Art(idx) => Ok(idx.delete(key)),
            Indexer::BPlusTree(idx) => idx.delete(key),
        }
    }

    /// Number of live keys.
    pub fn size(&self) -> Result<usize, IndexError> {
        match self {
            Indexer::BTree(idx) => Ok(idx.size()),
            Indexer::Art(idx) => Ok(idx.size()),
            Indexer::BPlusTree(idx) => idx.size(),
        }
    }

    /// Snapshot iterator over all entries.
    pub fn iterator(&self, reverse: bool) -> Result<IndexIterator, IndexError> {
        match self {
            Indexer::BTree(idx) => Ok(idx.iterator(reverse)),
            Indexer::Art(idx) => Ok(idx.iterator(reverse)),
            Indexer::BPlusTree(idx) => idx.iterator(reverse),
        }
    }

    /// Releases index resources; flushes the on-disk variant.
    pub fn close(&self) -> Result<(), IndexError> {
        match self {
            Indexer::BTree(_) | Indexer::Art(_) => Ok(()),
            Indexer::BPlusTree(idx) => idx.close(),
        }
    }
}
