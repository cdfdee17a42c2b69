//! Dump-log command implementation.

use super::read_log;
use crate::error::CliResult;
use crate::Format;
use layerdb_kv::{BatchOp, LogReader, LogRecord};
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Column family id (column records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_id: Option<u32>,
    /// Column family name (create records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// Put operations (batches only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puts: Option<usize>,
    /// Delete operations (batches only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletes: Option<usize>,
    /// Truncate operations (batches only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncates: Option<usize>,
}

/// Output of a log dump.
#[derive(Debug, Serialize)]
pub struct LogDump {
    /// Records at or after the start offset, up to the limit.
    pub records: Vec<LogRecordInfo>,
    /// Error that stopped the dump, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogRecordInfo {
    fn new(offset: u64, record: &LogRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: String::new(),
            column_id: None,
            column_name: None,
            puts: None,
            deletes: None,
            truncates: None,
        };
        match record {
            LogRecord::CreateColumn { id, name, .. } => {
                info.record_type = "CREATE_COLUMN".into();
                info.column_id = Some(id.as_u32());
                info.column_name = Some(name.clone());
            }
            LogRecord::DropColumn { id } => {
                info.record_type = "DROP_COLUMN".into();
                info.column_id = Some(id.as_u32());
            }
            LogRecord::Batch { ops } => {
                info.record_type = "BATCH".into();
                let count = |f: fn(&BatchOp) -> bool| ops.iter().filter(|op| f(op)).count();
                info.puts = Some(count(|op| matches!(op, BatchOp::Put { .. })));
                info.deletes = Some(count(|op| matches!(op, BatchOp::Delete { .. })));
                info.truncates = Some(count(|op| matches!(op, BatchOp::Truncate { .. })));
            }
        }
        info
    }
}

/// Decodes log records starting at `start_offset`.
pub fn dump_log(path: &Path, limit: Option<usize>, start_offset: u64) -> CliResult<LogDump> {
    let data = read_log(path)?;
    let max_records = limit.unwrap_or(usize::MAX);
    let mut dump = LogDump {
        records: Vec::new(),
        error: None,
    };

    for item in LogReader::new(&data) {
        if dump.records.len() >= max_records {
            break;
        }
        match item {
            Ok((offset, record)) if offset >= start_offset => {
                dump.records.push(LogRecordInfo::new(offset, &record));
            }
            Ok(_) => {}
            Err(err) => dump.error = Some(err.to_string()),
        }
    }
    Ok(dump)
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, start_offset: u64, format: Format) -> CliResult<()> {
    let dump = dump_log(path, limit, start_offset)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&dump)?),
        Format::Text => print_text_output(&dump),
    }
    Ok(())
}

fn print_text_output(dump: &LogDump) {
    println!("Log Records");
    println!("===========");
    println!();

    for record in &dump.records {
        print!("[{:08}] {:<14}", record.offset, record.record_type);
        if let Some(id) = record.column_id {
            print!(" column={id}");
        }
        if let Some(name) = &record.column_name {
            print!(" name={name}");
        }
        if let (Some(puts), Some(deletes), Some(truncates)) =
            (record.puts, record.deletes, record.truncates)
        {
            print!(" puts={puts} deletes={deletes} truncates={truncates}");
        }
        println!();
    }

    println!();
    println!("Total: {} records", dump.records.len());
    if let Some(error) = &dump.error {
        println!("Stopped at error: {error}");
    }
}
