//! Error types for the key-value engine.

use layerdb_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors raised by a [`crate::KvEngine`].
#[derive(Debug, Error)]
pub enum KvError {
    /// The byte store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An I/O error outside the byte store (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log holds bytes that do not decode.
    #[error("log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the offending record.
        offset: u64,
        /// What was wrong.
        message: String,
    },

    /// A record's stored checksum does not match its bytes.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The named column family was not declared when the engine opened.
    #[error("unknown column family: {name}")]
    UnknownColumnFamily {
        /// Name that was looked up.
        name: String,
    },

    /// A handle refers to a column family that has since been dropped.
    #[error("column family {id} has been dropped")]
    ColumnFamilyDropped {
        /// Id of the dropped column family.
        id: u32,
    },

    /// A handle or batch created by one engine was given to another.
    #[error("handle belongs to engine {handle_engine}, not engine {engine}")]
    ForeignHandle {
        /// Engine the handle was issued by.
        handle_engine: u64,
        /// Engine it was presented to.
        engine: u64,
    },

    /// A value is larger than its column family allows.
    #[error("value of {size} bytes exceeds limit of {limit} bytes in column family {column}")]
    ValueTooLarge {
        /// Column family name.
        column: String,
        /// Size of the rejected value.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The store does not exist and `create_if_missing` is off.
    #[error("store not found: {path}")]
    NotFound {
        /// Directory that was expected.
        path: String,
    },

    /// A failure injected by a test engine.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl KvError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates an unknown column family error.
    pub fn unknown_column(name: impl Into<String>) -> Self {
        Self::UnknownColumnFamily { name: name.into() }
    }
}
