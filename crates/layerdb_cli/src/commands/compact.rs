//! Compact command implementation.

use super::{format_size, replay};
use crate::error::CliResult;
use layerdb_kv::{CompactStats, LogEngine};
use std::path::Path;
use tracing::info;

/// Compacts a store, or reports what compaction would keep.
pub fn compact(path: &Path, dry_run: bool) -> CliResult<CompactStats> {
    if dry_run {
        let engine = replay(path)?;
        let stats = engine.stats()?;
        return Ok(CompactStats {
            bytes_before: stats.log_bytes,
            bytes_after: 0,
            columns: stats.columns.len(),
            keys: stats.keys(),
        });
    }
    let stats = LogEngine::compact_dir(path)?;
    info!(
        before = stats.bytes_before,
        after = stats.bytes_after,
        "compacted store"
    );
    Ok(stats)
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    println!("Compacting store at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    println!("Column families: {}", stats.columns);
    println!("Live keys:       {}", stats.keys);
    println!("Log before:      {} bytes", format_size(stats.bytes_before));
    if !dry_run {
        println!("Log after:       {} bytes", format_size(stats.bytes_after));
        let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
        println!("Reclaimed:       {} bytes", format_size(saved));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::dump::dump;
    use crate::commands::testutil::sample_store;

    #[test]
    fn compaction_keeps_live_entries() {
        let dir = tempfile::tempdir().unwrap();
        sample_store(dir.path());

        let stats = compact(dir.path(), false).unwrap();
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(stats.keys, 2);

        let entries = dump(dir.path(), "items", None).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        sample_store(dir.path());
        let before = std::fs::read(dir.path().join(layerdb_kv::LOG_FILE)).unwrap();

        let stats = compact(dir.path(), true).unwrap();
        assert_eq!(stats.keys, 2);
        let after = std::fs::read(dir.path().join(layerdb_kv::LOG_FILE)).unwrap();
        assert_eq!(before, after);
    }
}
