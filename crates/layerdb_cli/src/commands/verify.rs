//! Verify command implementation.

use super::{read_log, replay};
use crate::error::{CliError, CliResult};
use layerdb_kv::VerifyReport;
use std::path::Path;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Record-level scan of the log.
    pub report: VerifyReport,
    /// Why replaying the log failed, if it did.
    pub replay_error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.report.is_ok() && self.replay_error.is_none()
    }
}

/// Checks framing and checksums of every record, then replays the log.
pub fn verify(path: &Path) -> CliResult<VerifyResult> {
    let data = read_log(path)?;
    let report = VerifyReport::scan(&data);
    let replay_error = if report.error.is_none() {
        replay(path).err().map(|err| err.to_string())
    } else {
        None
    };
    Ok(VerifyResult {
        report,
        replay_error,
    })
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying store at {}", path.display());
    println!();

    let result = verify(path)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err(CliError::VerifyFailed)
    }
}

fn print_result(result: &VerifyResult) {
    let report = &result.report;
    println!(
        "  Records: {} ({} column creates, {} column drops, {} batches)",
        report.records, report.column_creates, report.column_drops, report.batches
    );
    println!("  Operations: {}", report.operations);
    println!(
        "  Valid bytes: {} of {}",
        report.valid_bytes, report.total_bytes
    );
    if report.torn_tail {
        println!(
            "    WARNING: log ends in an incomplete record at offset {}",
            report.valid_bytes
        );
    }
    if let Some(error) = &report.error {
        println!("    ERROR: {error}");
    }
    if let Some(error) = &result.replay_error {
        println!("    ERROR: replay failed: {error}");
    }
}
