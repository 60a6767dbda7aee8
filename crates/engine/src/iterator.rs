//! Public iterator over live keys.
//!
//! A thin wrapper around the index snapshot iterator that resolves values
//! from disk on demand and applies the configured key prefix in either
//! direction. Like the index iterator beneath it, it is a point-in-time
//! snapshot: writes made after construction are not visible.

use index::IndexIterator;

use crate::{Engine, IteratorOptions, Result};

/// Iterates the live keys of an [`Engine`] in key order.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    inner: IndexIterator,
    options: IteratorOptions,
}

impl Engine {
    /// Creates an iterator over a snapshot of the current index.
    pub fn iterator(&self, options: IteratorOptions) -> Result<EngineIterator<'_>> {
        let inner = self.index.iterator(options.reverse)?;
        let mut iter = EngineIterator {
            engine: self,
            inner,
            options,
        };
        iter.skip_to_prefix();
        Ok(iter)
    }
}

impl EngineIterator<'_> {
    /// Repositions at the first matching entry.
    pub fn rewind(&mut self) {
        self.inner.rewind();
        self.skip_to_prefix();
    }

    /// Positions at the first matching entry `>= key` (or `<= key` when
    /// iterating in reverse).
    pub fn seek(&mut self, key: &[u8]) {
        self.inner.seek(key);
        self.skip_to_prefix();
    }

    /// Advances to the next matching entry.
    pub fn next(&mut self) {
        self.inner.next();
        self.skip_to_prefix();
    }

    /// True while the iterator points at an entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// Key of the current entry. Only meaningful while [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Reads the current entry's value from disk.
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.inner.value();
        let shard = self.engine.shard_of(self.inner.key());
        let guard = self.engine.shards[shard].read();
        self.engine.value_by_position(guard.active.as_ref(), &pos)
    }

    /// Releases the snapshot.
    pub fn close(&mut self) {
        self.inner.close();
    }

    fn skip_to_prefix(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while self.inner.valid() && !self.inner.key().starts_with(&self.options.prefix) {
            self.inner.next();
        }
    }
}

impl std::fmt::Debug for EngineIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineIterator")
            .field("prefix", &self.options.prefix)
            .field("reverse", &self.options.reverse)
            .field("valid", &self.valid())
            .finish()
    }
}
