//! LayerDB CLI
//!
//! Command-line tools for LayerDB store directories.
//!
//! # Commands
//!
//! - `inspect` - Display column families, key counts and log size
//! - `verify` - Check every log record and replay the log
//! - `dump` - Hex dump the entries of one column family
//! - `dump-log` - Dump log records for debugging
//! - `compact` - Rewrite the log with live state only

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use error::CliError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LayerDB command-line store tools.
#[derive(Parser)]
#[command(name = "layerdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display column families, key counts and log size
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check every log record and replay the log
    Verify,

    /// Hex dump the entries of one column family
    Dump {
        /// Column family to dump
        #[arg(short, long)]
        column: String,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip records before this byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Rewrite the log with live state only
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or(CliError::PathRequired("inspect"))?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or(CliError::PathRequired("verify"))?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            column,
            limit,
            format,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("dump"))?;
            commands::dump::run(&path, &column, limit, format)?;
        }
        Commands::DumpLog {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("dump-log"))?;
            commands::dump_log::run(&path, limit, offset, format)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or(CliError::PathRequired("compact"))?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("LayerDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LayerDB Core v{}", layerdb_core::VERSION);
            println!("Log format v{}", layerdb_kv::LOG_VERSION);
            println!("Snapshot format v{}", layerdb_core::SNAPSHOT_VERSION);
        }
    }

    Ok(())
}
