//! # LayerDB KV
//!
//! The embedded ordered key-value engine underneath LayerDB containers.
//!
//! The engine is a byte-range store partitioned into named column families.
//! Column families are declared when the engine is opened; afterwards the
//! set can only shrink (via [`KvEngine::drop_column_family`]) until the
//! engine is reopened with a different descriptor list.
//!
//! Writes go through a [`WriteBatch`], which the engine applies atomically:
//! either every operation in the batch becomes visible or none does.
//!
//! ## Engines
//!
//! - [`MemoryEngine`] - volatile, with fault injection for tests
//! - [`LogEngine`] - log-structured persistence over a
//!   [`layerdb_storage::StorageBackend`]; every batch is one CRC-protected
//!   log record, replayed into per-column memtables on open
//!
//! ## Example
//!
//! ```rust
//! use layerdb_kv::{ColumnDescriptor, KvEngine, MemoryEngine, WriteBatch};
//!
//! let engine = MemoryEngine::open(&[ColumnDescriptor::new("default")]).unwrap();
//! let cf = engine.column_family("default").unwrap();
//!
//! let mut batch = WriteBatch::new();
//! batch.put(&cf, b"k".to_vec(), b"v".to_vec());
//! engine.write(batch).unwrap();
//!
//! assert_eq!(engine.get(&cf, b"k").unwrap(), Some(b"v".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod column;
mod engine;
mod error;
mod log;
mod memory;
mod memtable;
mod record;

pub use batch::{BatchOp, WriteBatch};
pub use column::{ColumnDescriptor, ColumnHandle, ColumnId, ColumnOptions, EngineId};
pub use engine::KvEngine;
pub use error::{KvError, KvResult};
pub use log::{CompactStats, LogEngine, LogOptions, LogStats, LOCK_FILE, LOG_FILE};
pub use memory::MemoryEngine;
pub use record::{LogReader, LogRecord, LogRecordKind, VerifyReport, LOG_MAGIC, LOG_VERSION};
