//! # LayerDB Storage
//!
//! Byte-store backends used by the LayerDB key-value engine.
//!
//! A backend is an append-only byte log: it knows nothing about column
//! families, write batches or records. The `layerdb_kv` crate owns every
//! byte format written through it.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use layerdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"batch").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"batch");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
