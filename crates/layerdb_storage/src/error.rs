//! Error types for byte-store operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read asked for bytes past the end of the log.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Current size of the log.
        size: u64,
    },

    /// A truncation asked to grow the log.
    #[error("cannot truncate to {requested} bytes, log holds {size}")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size of the log.
        size: u64,
    },
}
