//! # LayerDB Core
//!
//! Persistent multi-index containers.
//!
//! A [`MultiIndexContainer`] holds records of one caller type and keeps
//! them reachable through an ordered list of index layers at once:
//!
//! - [`OrderedIndex`] - sorted by an extracted key
//! - [`HashedIndex`] - hashed by an extracted key
//! - [`SequencedIndex`] - insertion order, with relocation
//! - [`RandomAccessIndex`] - dense positions
//!
//! Mutations are all-or-nothing across layers. A persistent container maps
//! itself onto column families of a [`layerdb_kv::KvEngine`]: one base
//! column for record payloads and one column per layer, all written through
//! a single atomic batch per flush.
//!
//! ## Example
//!
//! ```rust
//! use layerdb_core::{ContainerConfig, IndexSpecifierList, MultiIndexContainer, OrderedIndex};
//! use layerdb_kv::MemoryEngine;
//! use std::sync::Arc;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Account {
//!     id: u64,
//!     name: String,
//! }
//!
//! let specs = || {
//!     IndexSpecifierList::new()
//!         .hashed_unique("by_id", |a: &Account| a.id)
//!         .ordered_unique("by_name", |a: &Account| a.name.clone())
//! };
//! let config = ContainerConfig::new().name("accounts");
//! let engine = Arc::new(MemoryEngine::open(&specs().column_descriptors(&config)).unwrap());
//!
//! let mut accounts = MultiIndexContainer::open(engine.clone(), specs(), config.clone()).unwrap();
//! accounts.insert(Account { id: 1, name: "alice".into() }).unwrap();
//! drop(accounts);
//!
//! let accounts = MultiIndexContainer::open(engine, specs(), config).unwrap();
//! let by_name = accounts.index::<OrderedIndex<Account, String>>(1).unwrap();
//! let alice = by_name.find(&"alice".to_string()).unwrap();
//! assert_eq!(accounts.get(alice).unwrap().id, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod config;
mod container;
mod copy;
mod error;
mod index;
mod node;
mod persist;
mod record;
mod snapshot;

pub use config::ContainerConfig;
pub use container::MultiIndexContainer;
pub use copy::CopyMap;
pub use error::{AllocationError, CloneError, ConflictKind, CoreError, CoreResult, StoreError};
pub use index::{
    BucketMap, HashedIndex, IndexKey, IndexKind, IndexLayer, IndexSpecifierList, KeyedIndex,
    OrderedIndex, RandomAccessIndex, Resolver, SequencedIndex,
};
pub use node::{NodeId, NodeStore, RecordId};
pub use persist::{parse_payload_key, payload_key, PersistentAdapter, NEXT_ID_KEY};
pub use record::{decode, encode, Record};
pub use snapshot::{SnapshotReader, SnapshotWriter, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
