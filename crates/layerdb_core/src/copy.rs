//! Container cloning.
//!
//! A clone first copies every node into a fresh [`NodeStore`], recording
//! old handle to new handle in a [`CopyMap`]. Each layer then rebuilds its
//! own structure by translating the handles it holds. Nothing is shared with
//! the source; a failure anywhere drops the partial clone.

use crate::error::CloneError;
use crate::index::IndexLayer;
use crate::node::{NodeId, NodeStore};
use crate::record::Record;
use std::collections::HashMap;
use tracing::debug;

/// Old node handle to new node handle, one entry per copied node.
#[derive(Debug, Default)]
pub struct CopyMap {
    map: HashMap<NodeId, NodeId>,
}

impl CopyMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the copy of `old`.
    pub fn insert(&mut self, old: NodeId, new: NodeId) {
        self.map.insert(old, new);
    }

    /// Returns the copy of `old`, if any.
    #[must_use]
    pub fn get(&self, old: NodeId) -> Option<NodeId> {
        self.map.get(&old).copied()
    }

    /// Returns the copy of `old` or a dangling reference error naming the
    /// layer that held it.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::DanglingReference`] if `old` was not copied.
    pub fn translate(&self, layer: &str, old: NodeId) -> Result<NodeId, CloneError> {
        self.get(old).ok_or_else(|| CloneError::DanglingReference {
            layer: layer.to_string(),
            node: old,
        })
    }

    /// Number of copied nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing was copied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Copies every node of `source` into a new store limited to `max_nodes`.
///
/// Record ids are kept. On allocation failure the new store is dropped with
/// whatever it held.
pub(crate) fn clone_nodes<V: Record>(
    source: &NodeStore<V>,
    max_nodes: usize,
) -> Result<(NodeStore<V>, CopyMap), CloneError> {
    let mut nodes = NodeStore::new(max_nodes);
    let mut map = CopyMap::new();
    map.map.reserve(source.len());
    for (old, record_id, value) in source.iter() {
        let new = nodes.allocate(record_id, value.clone())?;
        map.insert(old, new);
    }
    Ok((nodes, map))
}

/// Rebuilds every layer against a copy map, in specifier order.
pub(crate) fn clone_layers<V: Record>(
    layers: &[Box<dyn IndexLayer<V>>],
    map: &CopyMap,
) -> Result<Vec<Box<dyn IndexLayer<V>>>, CloneError> {
    let mut cloned = Vec::with_capacity(layers.len());
    for layer in layers {
        cloned.push(layer.clone_with(map)?);
        debug!(layer = layer.name(), nodes = map.len(), "cloned layer");
    }
    Ok(cloned)
}
