//! # LayerDB Testkit
//!
//! Test utilities for LayerDB.
//!
//! This crate provides:
//! - A sample [`Account`] record with ready-made layer lists
//! - Store fixtures over temporary directories and in-memory backends
//! - Property-based test generators using proptest
//! - A model-checking harness that mirrors a container in plain collections
//!
//! ## Usage
//!
//! ```rust
//! use layerdb_testkit::prelude::*;
//!
//! let store = TestStore::new();
//! let mut accounts = store.open();
//! accounts.insert(Account::new(1, "alice", 10)).unwrap();
//! drop(accounts);
//!
//! assert_eq!(store.open().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
