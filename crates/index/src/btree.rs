//! Ordered B-tree index backed by the standard library's `BTreeMap`.

use std::collections::BTreeMap;

use logfile::RecordPos;
use parking_lot::RwLock;

use crate::IndexIterator;

/// In-memory ordered index. Writes take the write lock, reads the read lock.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, RecordPos>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn put(&self, key: &[u8], pos: RecordPos) -> Option<RecordPos> {
        self.tree.write().insert(key.to_vec(), pos)
    }

    pub fn get(&self, key: &[u8]) -> Option<RecordPos> {
        self.tree.read().get(key).copied()
    }

    pub fn delete(&self, key: &[u8]) -> (Option<RecordPos>, bool) {
        let old = self.tree.write().remove(key);
        let existed = old.is_some();
        (old, existed)
    }

    pub fn size(&self) -> usize {
        self.tree.read().len()
    }

    pub fn iterator(&self, reverse: bool) -> IndexIterator {
        let items: Vec<(Vec<u8>, RecordPos)> = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        IndexIterator::new(items, reverse)
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}
