//! Index layers.
//!
//! Every layer is one access path over the same node set. The container
//! holds its layers as an ordered `Vec<Box<dyn IndexLayer<V>>>` and drives
//! them through a two-phase protocol: `try_*` on each layer in order, then
//! either `commit_*` on all of them or `rollback_*` on the ones that
//! succeeded, in exact reverse order.
//!
//! # Layer kinds
//!
//! - [`OrderedIndex`]: sorted by an extracted key, unique or not
//! - [`HashedIndex`]: hashed by an extracted key, unique or not
//! - [`SequencedIndex`]: insertion order, with explicit relocation
//! - [`RandomAccessIndex`]: dense positions

mod hashed;
mod key;
mod keyed;
mod list;
mod ordered;
mod random_access;
mod sequenced;

pub use hashed::HashedIndex;
pub use key::IndexKey;
pub use keyed::{BucketMap, KeyedIndex};
pub use list::IndexSpecifierList;
pub(crate) use list::descriptors;
pub use ordered::OrderedIndex;
pub use random_access::RandomAccessIndex;
pub use sequenced::SequencedIndex;

use crate::copy::CopyMap;
use crate::error::{CloneError, ConflictKind, CoreError, CoreResult};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::record::Record;
use crate::snapshot::{SnapshotReader, SnapshotWriter};
use layerdb_kv::ColumnOptions;
use std::any::Any;
use std::fmt;

/// Kind of an index layer. The discriminant is the snapshot code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexKind {
    /// Sorted by key.
    Ordered = 1,
    /// Hashed by key.
    Hashed = 2,
    /// Insertion order.
    Sequenced = 3,
    /// Dense positions.
    RandomAccess = 4,
}

impl IndexKind {
    /// Converts a snapshot code.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Ordered),
            2 => Some(Self::Hashed),
            3 => Some(Self::Sequenced),
            4 => Some(Self::RandomAccess),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ordered => "ordered",
            Self::Hashed => "hashed",
            Self::Sequenced => "sequenced",
            Self::RandomAccess => "random_access",
        })
    }
}

/// Resolves a persisted record id to the node that holds it.
pub type Resolver<'a> = &'a dyn Fn(RecordId) -> Option<NodeId>;

/// One access path of a container.
///
/// Layers never own records and never allocate or destroy nodes; they only
/// arrange [`NodeId`] handles. Values are passed in by the container.
pub trait IndexLayer<V: Record>: Send + Sync {
    /// Layer name, unique within a container.
    fn name(&self) -> &str;

    /// Layer kind.
    fn kind(&self) -> IndexKind;

    /// Whether the layer refuses duplicate keys.
    fn unique(&self) -> bool {
        false
    }

    /// Number of nodes in the layer.
    fn len(&self) -> usize;

    /// Returns true if the layer holds no node.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Options for this layer's column family.
    fn column_options(&self) -> ColumnOptions {
        ColumnOptions::default()
    }

    /// Links a new node into the layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictKind::DuplicateKey`] if a unique key is taken. The
    /// layer is unchanged in that case.
    fn try_insert(&mut self, node: NodeId, value: &V) -> Result<(), ConflictKind>;

    /// Finalizes a successful `try_insert` once every layer accepted it.
    fn commit_insert(&mut self, _node: NodeId, _value: &V) {}

    /// Undoes a successful `try_insert`.
    fn rollback_insert(&mut self, node: NodeId, value: &V);

    /// Unlinks a node. Never fails.
    fn erase(&mut self, node: NodeId, value: &V);

    /// Re-keys a node whose value changed from `old` to `new`.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictKind::DuplicateKey`] if the new key is taken. The
    /// layer is unchanged in that case.
    fn try_modify(&mut self, _node: NodeId, _old: &V, _new: &V) -> Result<(), ConflictKind> {
        Ok(())
    }

    /// Finalizes a successful `try_modify`.
    fn commit_modify(&mut self, _node: NodeId, _old: &V, _new: &V) {}

    /// Undoes a successful `try_modify`, putting the node back exactly where
    /// it was.
    fn rollback_modify(&mut self, _node: NodeId, _old: &V, _new: &V) {}

    /// Unlinks every node.
    fn clear(&mut self);

    /// The entry this layer keeps in its column family for a node.
    fn column_entry(&self, node: NodeId, record: RecordId, value: &V) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Writes the layer's structure: an entry count and the entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a node in the layer is missing from `nodes`.
    fn save(&self, nodes: &NodeStore<V>, out: &mut SnapshotWriter) -> CoreResult<()>;

    /// Rebuilds the layer from a snapshot written by `save`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed, references a record that
    /// does not exist, or breaks the layer's own invariants.
    fn load(
        &mut self,
        input: &mut SnapshotReader<'_>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()>;

    /// Rebuilds the layer from its column family entries, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as `load`.
    fn restore(
        &mut self,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()>;

    /// Builds a copy of this layer whose handles are translated through
    /// `map`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::DanglingReference`] for a handle without a copy.
    fn clone_with(&self, map: &CopyMap) -> Result<Box<dyn IndexLayer<V>>, CloneError>;

    /// Checks the layer's structure against the node store.
    fn check_invariant(&self, nodes: &NodeStore<V>) -> bool;

    /// Upcast for typed views.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed operations.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Column entry of a positional layer: rank to record id.
pub(crate) fn rank_entry(rank: u64, record: RecordId) -> (Vec<u8>, Vec<u8>) {
    (rank.to_be_bytes().to_vec(), record.to_be_bytes().to_vec())
}

/// Parses positional column entries into `(rank, node)` pairs.
pub(crate) fn parse_rank_entries(
    layer: &str,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    resolve: Resolver<'_>,
) -> CoreResult<Vec<(u64, NodeId)>> {
    entries
        .into_iter()
        .map(|(key, value)| {
            let rank = RecordId::from_be_slice(&key)
                .map(RecordId::as_u64)
                .ok_or_else(|| bad_entry(layer, "rank is not 8 bytes"))?;
            let node = resolve_value(layer, &value, resolve)?;
            Ok((rank, node))
        })
        .collect()
}

pub(crate) fn resolve_value(layer: &str, value: &[u8], resolve: Resolver<'_>) -> CoreResult<NodeId> {
    let record = RecordId::from_be_slice(value)
        .ok_or_else(|| bad_entry(layer, "record id is not 8 bytes"))?;
    resolve_record(layer, record, resolve)
}

pub(crate) fn resolve_record(
    layer: &str,
    record: RecordId,
    resolve: Resolver<'_>,
) -> CoreResult<NodeId> {
    resolve(record).ok_or_else(|| {
        CoreError::invalid_format(format!("layer {layer} references missing record {record}"))
    })
}

pub(crate) fn bad_entry(layer: &str, what: &str) -> CoreError {
    CoreError::invalid_format(format!("bad column entry in layer {layer}: {what}"))
}

/// Fails unless a rebuilt layer covers every node.
pub(crate) fn check_count(layer: &str, len: usize, nodes: usize) -> CoreResult<()> {
    if len != nodes {
        return Err(CoreError::invalid_format(format!(
            "layer {layer} holds {len} entries for {nodes} records"
        )));
    }
    Ok(())
}
