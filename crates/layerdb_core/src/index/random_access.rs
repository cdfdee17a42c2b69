//! Random-access layers.

use super::{
    check_count, parse_rank_entries, rank_entry, resolve_record, IndexKind, IndexLayer, Resolver,
};
use crate::copy::CopyMap;
use crate::error::{CloneError, ConflictKind, CoreError, CoreResult};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::record::Record;
use crate::snapshot::{SnapshotReader, SnapshotWriter};
use std::any::Any;
use std::collections::HashMap;

/// A layer giving dense positional access in insertion order.
///
/// Positions are dense (`0..len`) and shift on erase. Each node also has a
/// persistent rank, increasing with position, which keys the layer's column
/// family.
#[derive(Debug, Clone)]
pub struct RandomAccessIndex {
    name: String,
    slots: Vec<(u64, NodeId)>,
    ranks: HashMap<NodeId, u64>,
    next_rank: u64,
}

impl RandomAccessIndex {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            ranks: HashMap::new(),
            next_rank: 0,
        }
    }

    /// Returns the node at `position`.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<NodeId> {
        self.slots.get(position).map(|(_, node)| *node)
    }

    /// Returns the position of a node.
    #[must_use]
    pub fn position_of(&self, node: NodeId) -> Option<usize> {
        let rank = self.ranks.get(&node)?;
        self.slots.binary_search_by_key(rank, |(r, _)| *r).ok()
    }

    /// Iterates in position order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + ExactSizeIterator + '_ {
        self.slots.iter().map(|(_, node)| *node)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the layer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn load_sorted(&mut self, mut entries: Vec<(u64, NodeId)>) -> CoreResult<()> {
        entries.sort_unstable_by_key(|(rank, _)| *rank);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(CoreError::invalid_format(format!(
                    "layer {} repeats rank {}",
                    self.name, pair[0].0
                )));
            }
        }
        for (rank, node) in &entries {
            if self.ranks.insert(*node, *rank).is_some() {
                return Err(CoreError::invalid_format(format!(
                    "layer {} lists node {node} twice",
                    self.name
                )));
            }
        }
        self.next_rank = entries.last().map_or(0, |(rank, _)| rank + 1);
        self.slots = entries;
        Ok(())
    }
}

impl<V: Record> IndexLayer<V> for RandomAccessIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::RandomAccess
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn try_insert(&mut self, node: NodeId, _value: &V) -> Result<(), ConflictKind> {
        let rank = self.next_rank;
        self.next_rank += 1;
        self.slots.push((rank, node));
        self.ranks.insert(node, rank);
        Ok(())
    }

    fn rollback_insert(&mut self, node: NodeId, value: &V) {
        if let Some(rank) = self.ranks.get(&node).copied() {
            IndexLayer::<V>::erase(self, node, value);
            if rank + 1 == self.next_rank {
                self.next_rank = rank;
            }
        }
    }

    fn erase(&mut self, node: NodeId, _value: &V) {
        if let Some(pos) = self.position_of(node) {
            self.slots.remove(pos);
            self.ranks.remove(&node);
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.ranks.clear();
        self.next_rank = 0;
    }

    fn column_entry(&self, node: NodeId, record: RecordId, _value: &V) -> Option<(Vec<u8>, Vec<u8>)> {
        self.ranks.get(&node).map(|rank| rank_entry(*rank, record))
    }

    fn save(&self, nodes: &NodeStore<V>, out: &mut SnapshotWriter) -> CoreResult<()> {
        out.put_u64(self.slots.len() as u64);
        for (rank, node) in &self.slots {
            let record = nodes
                .record_id(*node)
                .ok_or(CoreError::NodeNotFound { node: *node })?;
            out.put_u64(*rank);
            out.put_record(record);
        }
        Ok(())
    }

    fn load(
        &mut self,
        input: &mut SnapshotReader<'_>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()> {
        let count = input.count(16)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let rank = input.u64()?;
            entries.push((rank, resolve_record(&self.name, input.record()?, resolve)?));
        }
        self.load_sorted(entries)?;
        check_count(&self.name, self.slots.len(), nodes.len())
    }

    fn restore(
        &mut self,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()> {
        let entries = parse_rank_entries(&self.name, entries, resolve)?;
        self.load_sorted(entries)?;
        check_count(&self.name, self.slots.len(), nodes.len())
    }

    fn clone_with(&self, map: &CopyMap) -> Result<Box<dyn IndexLayer<V>>, CloneError> {
        let slots = self
            .slots
            .iter()
            .map(|(rank, node)| map.translate(&self.name, *node).map(|copy| (*rank, copy)))
            .collect::<Result<Vec<_>, CloneError>>()?;
        let ranks = slots.iter().map(|(rank, node)| (*node, *rank)).collect();
        Ok(Box::new(Self {
            name: self.name.clone(),
            slots,
            ranks,
            next_rank: self.next_rank,
        }))
    }

    fn check_invariant(&self, nodes: &NodeStore<V>) -> bool {
        self.slots.len() == self.ranks.len()
            && self.slots.len() == nodes.len()
            && self.slots.windows(2).all(|w| w[0].0 < w[1].0)
            && self
                .slots
                .iter()
                .all(|(rank, node)| self.ranks.get(node) == Some(rank) && nodes.contains(*node))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
