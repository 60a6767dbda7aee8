//! Snapshot iterator shared by every index implementation.

use logfile::RecordPos;

/// Iterates a point-in-time snapshot of the index.
///
/// The snapshot is taken when the iterator is constructed; writes made
/// afterwards are not visible. In reverse mode the entries are visited in
/// descending key order and `seek` positions at the first entry `<=` the
/// given key instead of `>=`.
pub struct IndexIterator {
    items: Vec<(Vec<u8>, RecordPos)>,
    cur: usize,
    reverse: bool,
}

impl IndexIterator {
    /// Builds an iterator from entries sorted in ascending key order.
    pub(crate) fn new(mut items: Vec<(Vec<u8>, RecordPos)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self {
            items,
            cur: 0,
            reverse,
        }
    }

    /// Repositions at the first entry.
    pub fn rewind(&mut self) {
        self.cur = 0;
    }

    /// Positions at the first entry `>= key` (forward) or `<= key` (reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.cur = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    /// Advances to the next entry.
    pub fn next(&mut self) {
        self.cur = self.cur.saturating_add(1);
    }

    /// True while the iterator points at an entry.
    pub fn valid(&self) -> bool {
        self.cur < self.items.len()
    }

    /// Key of the current entry. Only meaningful while [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        &self.items[self.cur].0
    }

    /// Position of the current entry. Only meaningful while [`valid`](Self::valid).
    pub fn value(&self) -> RecordPos {
        self.items[self.cur].1
    }

    /// Releases the snapshot.
    pub fn close(&mut self) {
        self.items = Vec::new();
        self.cur = 0;
    }
}
