//! CLI errors.

use layerdb_kv::KvError;
use layerdb_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("store path required for {0}")]
    PathRequired(&'static str),

    /// The directory holds no log file.
    #[error("no store found at {}", .0.display())]
    NoStore(PathBuf),

    /// The log failed verification.
    #[error("verification failed")]
    VerifyFailed,

    /// Engine error.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
