//! Benchmark helpers for LayerDB.

pub mod utils;
