//! Engine configuration.
//!
//! Centralized configuration with sensible defaults, validated at open time.

use std::path::PathBuf;

use crate::error::{KvError, Result};

pub use index::IndexType;

/// Configuration for one [`Engine`](crate::Engine) instance.
#[derive(Debug, Clone)]
pub struct Options {
    /// Root directory for all database files.
    pub dir_path: PathBuf,

    /// Maximum size of a data file before it is sealed and rotated.
    pub data_file_size: u32,

    /// Fsync after every append.
    pub sync_writes: bool,

    /// Fsync after this many cumulative bytes written (0 disables).
    pub bytes_per_sync: u64,

    /// Which index implementation backs the key directory.
    pub index_type: IndexType,

    /// Memory-map data files while rebuilding the index at open.
    pub mmap_at_startup: bool,

    /// `reclaimable / total` ratio that must be reached before merge runs.
    pub data_file_merge_ratio: f32,

    /// Number of independent append shards.
    pub slots: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./lodekv-data"),
            data_file_size: 256 * 1024 * 1024, // 256 MiB
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::Art,
            mmap_at_startup: true,
            data_file_merge_ratio: 0.5,
            slots: 4,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(KvError::OptionsInvalid(
                "database dir path is empty".to_string(),
            ));
        }
        if self.data_file_size == 0 {
            return Err(KvError::OptionsInvalid(
                "data file size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.data_file_merge_ratio) {
            return Err(KvError::OptionsInvalid(
                "merge ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.slots == 0 {
            return Err(KvError::OptionsInvalid(
                "slot count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for an engine iterator.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only visit keys carrying this prefix (empty visits everything).
    pub prefix: Vec<u8>,

    /// Walk in descending key order.
    pub reverse: bool,
}

/// Options for an atomic write batch.
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of buffered mutations in one batch.
    pub max_batch_size: usize,

    /// Fsync the touched active files when the batch commits.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 10_000,
            sync_writes: true,
        }
    }
}
