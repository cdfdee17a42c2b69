//! Dump command implementation.

use super::replay;
use crate::error::CliResult;
use crate::Format;
use layerdb_kv::KvEngine;
use serde::Serialize;
use std::path::Path;

/// One column family entry, hex encoded.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Key bytes.
    pub key: String,
    /// Value bytes.
    pub value: String,
    /// Value length in bytes.
    pub value_len: usize,
}

/// Reads up to `limit` entries of a column family in key order.
pub fn dump(path: &Path, column: &str, limit: Option<usize>) -> CliResult<Vec<EntryInfo>> {
    let engine = replay(path)?;
    let cf = engine.column_family(column)?;
    let entries = engine
        .scan(&cf)?
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(key, value)| EntryInfo {
            key: hex::encode(key),
            value_len: value.len(),
            value: hex::encode(value),
        })
        .collect();
    Ok(entries)
}

/// Runs the dump command.
pub fn run(path: &Path, column: &str, limit: Option<usize>, format: Format) -> CliResult<()> {
    let entries = dump(path, column, limit)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => {
            println!("Column family {column}: {} entries", entries.len());
            println!();
            for entry in &entries {
                println!("{} => {} ({} bytes)", entry.key, entry.value, entry.value_len);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::sample_store;
    use crate::error::CliError;
    use layerdb_kv::KvError;

    #[test]
    fn dumps_live_entries_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        sample_store(dir.path());

        let entries = dump(dir.path(), "items", None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, hex::encode(b"r1"));
        assert_eq!(entries[0].value, hex::encode(b"alpha"));
        assert_eq!(entries[0].value_len, 5);
    }

    #[test]
    fn limit_caps_the_output() {
        let dir = tempfile::tempdir().unwrap();
        sample_store(dir.path());
        assert!(dump(dir.path(), "items.by_key", Some(0)).unwrap().is_empty());
    }

    #[test]
    fn unknown_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        sample_store(dir.path());
        assert!(matches!(
            dump(dir.path(), "nope", None),
            Err(CliError::Kv(KvError::UnknownColumnFamily { .. }))
        ));
    }
}
