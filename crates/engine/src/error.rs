//! Error types for the storage engine.
//!
//! One unified error enum for every public operation.

use thiserror::Error;

/// Result type alias using [`KvError`].
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record error: {0}")]
    Record(#[from] logfile::RecordError),

    #[error("index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("key not found in database")]
    KeyNotFound,

    #[error("data file is not found")]
    DataFileNotFound,

    #[error("failed to update the index")]
    IndexUpdateFailed,

    #[error("batch exceeds the configured maximum size")]
    BatchTooLarge,

    #[error("merge is already in progress, try again later")]
    MergeInProgress,

    #[error("the merge ratio has not been reached")]
    MergeRatioUnreached,

    #[error("not enough free disk space for merge")]
    NoSpaceForMerge,

    #[error("the database directory is in use by another process")]
    DatabaseInUse,

    #[error("the data directory may be corrupted")]
    DataDirectoryCorrupted,

    #[error("invalid options: {0}")]
    OptionsInvalid(String),
}
