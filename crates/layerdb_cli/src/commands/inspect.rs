//! Inspect command implementation.

use super::{format_size, replay};
use crate::error::CliResult;
use crate::Format;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Log size in bytes.
    pub log_bytes: u64,
    /// Live key and value bytes.
    pub live_bytes: u64,
    /// Total live keys.
    pub keys: usize,
    /// Column families in id order.
    pub columns: Vec<ColumnInfo>,
}

/// Statistics for one column family.
#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    /// Column family name.
    pub name: String,
    /// Live keys.
    pub keys: usize,
}

/// Collects the inspection figures of a store.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let engine = replay(path)?;
    let stats = engine.stats()?;
    Ok(InspectResult {
        path: path.display().to_string(),
        log_bytes: stats.log_bytes,
        live_bytes: stats.live_bytes,
        keys: stats.keys(),
        columns: stats
            .columns
            .into_iter()
            .map(|(name, keys)| ColumnInfo { name, keys })
            .collect(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> CliResult<()> {
    let result = inspect(path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("LayerDB Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:   {} bytes", format_size(result.log_bytes));
    println!("  Live data:  {} bytes", format_size(result.live_bytes));
    println!();
    println!("Column families ({}):", result.columns.len());
    for column in &result.columns {
        println!("  {:<32} {} keys", column.name, column.keys);
    }
    println!();
    println!("Total keys: {}", result.keys);
}
