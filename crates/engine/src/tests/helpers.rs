use std::fs;
use std::path::Path;

use logfile::DATA_FILE_SUFFIX;

use crate::{IndexType, Options};

/// Small-file options suitable for tests: 64 KiB segments, four shards, no
/// merge-ratio gate.
pub fn test_options(dir: &Path) -> Options {
    Options {
        dir_path: dir.to_path_buf(),
        data_file_size: 64 * 1024,
        sync_writes: false,
        bytes_per_sync: 0,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        data_file_merge_ratio: 0.0,
        slots: 4,
    }
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .ends_with(DATA_FILE_SUFFIX)
        })
        .count()
}

pub fn max_data_file_id(dir: &Path) -> u32 {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .strip_suffix(DATA_FILE_SUFFIX)
                .and_then(|stem| stem.parse::<u32>().ok())
        })
        .max()
        .unwrap_or(0)
}
