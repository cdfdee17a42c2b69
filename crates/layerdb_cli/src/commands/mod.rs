//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use crate::error::{CliError, CliResult};
use layerdb_kv::{LogEngine, LogOptions, LOG_FILE};
use layerdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use tracing::debug;

/// Reads the whole log of a store directory.
pub fn read_log(path: &Path) -> CliResult<Vec<u8>> {
    let log_path = path.join(LOG_FILE);
    if !log_path.exists() {
        return Err(CliError::NoStore(path.to_path_buf()));
    }
    let data = FileBackend::open(&log_path)?.read_all()?;
    debug!(path = %log_path.display(), bytes = data.len(), "read log");
    Ok(data)
}

/// Replays a store's log into memory without touching the directory.
pub fn replay(path: &Path) -> CliResult<LogEngine> {
    let data = read_log(path)?;
    let backend = Box::new(InMemoryBackend::with_data(data));
    Ok(LogEngine::open(
        backend,
        &[],
        LogOptions::new().sync_on_write(false),
    )?)
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
