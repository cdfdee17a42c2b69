//! Sequenced layers.

use super::{
    check_count, parse_rank_entries, rank_entry, resolve_record, IndexKind, IndexLayer, Resolver,
};
use crate::copy::CopyMap;
use crate::error::{CloneError, ConflictKind, CoreError, CoreResult};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::record::Record;
use crate::snapshot::{SnapshotReader, SnapshotWriter};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

/// Ranks start in the middle of the range so a node can move in front of
/// the first one without renumbering.
const ORIGIN: u64 = 1 << 63;

/// A layer keeping nodes in insertion order.
///
/// Each node carries a persistent rank; new nodes get a rank past the back,
/// [`crate::MultiIndexContainer::relocate_to_front`] gives one before the
/// front. Ranks are the keys of the layer's column family.
#[derive(Debug, Clone)]
pub struct SequencedIndex {
    name: String,
    order: BTreeMap<u64, NodeId>,
    ranks: HashMap<NodeId, u64>,
    next_back: u64,
    next_front: u64,
}

impl SequencedIndex {
    /// Creates an empty layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: BTreeMap::new(),
            ranks: HashMap::new(),
            next_back: ORIGIN,
            next_front: ORIGIN - 1,
        }
    }

    /// Returns the first node.
    #[must_use]
    pub fn front(&self) -> Option<NodeId> {
        self.order.values().next().copied()
    }

    /// Returns the last node.
    #[must_use]
    pub fn back(&self) -> Option<NodeId> {
        self.order.values().next_back().copied()
    }

    /// Iterates front to back.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.order.values().copied()
    }

    /// Iterates back to front.
    pub fn iter_rev(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.values().rev().copied()
    }

    /// Returns the persistent rank of a node.
    #[must_use]
    pub fn rank_of(&self, node: NodeId) -> Option<u64> {
        self.ranks.get(&node).copied()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the layer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Moves a node to the front. Returns `(old rank, new rank)`.
    pub(crate) fn relocate_to_front(&mut self, node: NodeId) -> Option<(u64, u64)> {
        let old = self.ranks.get(&node).copied()?;
        if self.front() == Some(node) {
            return Some((old, old));
        }
        let new = self.next_front;
        self.next_front -= 1;
        self.rerank(node, old, new);
        Some((old, new))
    }

    /// Moves a node to the back. Returns `(old rank, new rank)`.
    pub(crate) fn relocate_to_back(&mut self, node: NodeId) -> Option<(u64, u64)> {
        let old = self.ranks.get(&node).copied()?;
        if self.back() == Some(node) {
            return Some((old, old));
        }
        let new = self.next_back;
        self.next_back += 1;
        self.rerank(node, old, new);
        Some((old, new))
    }

    fn rerank(&mut self, node: NodeId, old: u64, new: u64) {
        self.order.remove(&old);
        self.order.insert(new, node);
        self.ranks.insert(node, new);
    }

    fn place(&mut self, rank: u64, node: NodeId) -> CoreResult<()> {
        if self.ranks.contains_key(&node) || self.order.contains_key(&rank) {
            return Err(CoreError::invalid_format(format!(
                "layer {} repeats rank {rank} or node {node}",
                self.name
            )));
        }
        self.order.insert(rank, node);
        self.ranks.insert(node, rank);
        Ok(())
    }

    /// Resets the rank counters around the loaded ranks.
    fn settle(&mut self) {
        self.next_back = self
            .order
            .keys()
            .next_back()
            .map_or(ORIGIN, |rank| rank.saturating_add(1).max(ORIGIN));
        self.next_front = self
            .order
            .keys()
            .next()
            .map_or(ORIGIN - 1, |rank| rank.saturating_sub(1).min(ORIGIN - 1));
    }
}

impl<V: Record> IndexLayer<V> for SequencedIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Sequenced
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn try_insert(&mut self, node: NodeId, _value: &V) -> Result<(), ConflictKind> {
        let rank = self.next_back;
        self.next_back += 1;
        self.order.insert(rank, node);
        self.ranks.insert(node, rank);
        Ok(())
    }

    fn rollback_insert(&mut self, node: NodeId, value: &V) {
        if let Some(rank) = self.ranks.get(&node).copied() {
            IndexLayer::<V>::erase(self, node, value);
            if rank + 1 == self.next_back {
                self.next_back = rank;
            }
        }
    }

    fn erase(&mut self, node: NodeId, _value: &V) {
        if let Some(rank) = self.ranks.remove(&node) {
            self.order.remove(&rank);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ranks.clear();
        self.next_back = ORIGIN;
        self.next_front = ORIGIN - 1;
    }

    fn column_entry(&self, node: NodeId, record: RecordId, _value: &V) -> Option<(Vec<u8>, Vec<u8>)> {
        self.rank_of(node).map(|rank| rank_entry(rank, record))
    }

    fn save(&self, nodes: &NodeStore<V>, out: &mut SnapshotWriter) -> CoreResult<()> {
        out.put_u64(self.order.len() as u64);
        for (rank, node) in &self.order {
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
        for _ in 0..count {
            let rank = input.u64()?;
            let node = resolve_record(&self.name, input.record()?, resolve)?;
            self.place(rank, node)?;
        }
        self.settle();
        check_count(&self.name, self.order.len(), nodes.len())
    }

    fn restore(
        &mut self,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()> {
        for (rank, node) in parse_rank_entries(&self.name, entries, resolve)? {
            self.place(rank, node)?;
        }
        self.settle();
        check_count(&self.name, self.order.len(), nodes.len())
    }

    fn clone_with(&self, map: &CopyMap) -> Result<Box<dyn IndexLayer<V>>, CloneError> {
        let mut order = BTreeMap::new();
        let mut ranks = HashMap::with_capacity(self.ranks.len());
        for (rank, node) in &self.order {
            let copy = map.translate(&self.name, *node)?;
            order.insert(*rank, copy);
            ranks.insert(copy, *rank);
        }
        Ok(Box::new(Self {
            name: self.name.clone(),
            order,
            ranks,
            next_back: self.next_back,
            next_front: self.next_front,
        }))
    }

    fn check_invariant(&self, nodes: &NodeStore<V>) -> bool {
        self.order.len() == self.ranks.len()
            && self.order.len() == nodes.len()
            && self
                .order
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

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: u64) -> (NodeStore<u64>, SequencedIndex, Vec<NodeId>) {
        let mut nodes = NodeStore::new(64);
        let mut index = SequencedIndex::new("arrival");
        let ids = (0..n)
            .map(|i| {
                let id = nodes.allocate(RecordId(i), i).unwrap();
                IndexLayer::<u64>::try_insert(&mut index, id, &i).unwrap();
                id
            })
            .collect();
        (nodes, index, ids)
    }

    #[test]
    fn keeps_insertion_order() {
        let (_, index, ids) = filled(4);
        assert_eq!(index.iter().collect::<Vec<_>>(), ids);
        assert_eq!(index.front(), Some(ids[0]));
        assert_eq!(index.back(), Some(ids[3]));
        assert_eq!(index.iter_rev().next(), Some(ids[3]));
    }

    #[test]
    fn relocation_changes_rank() {
        let (nodes, mut index, ids) = filled(3);
        let (old, new) = index.relocate_to_front(ids[2]).unwrap();
        assert!(new < old);
        assert_eq!(index.front(), Some(ids[2]));

        let (_, back) = index.relocate_to_back(ids[2]).unwrap();
        assert_eq!(index.back(), Some(ids[2]));
        assert_eq!(index.rank_of(ids[2]), Some(back));
        assert!(IndexLayer::<u64>::check_invariant(&index, &nodes));
    }

    #[test]
    fn rollback_reuses_the_rank() {
        let (_, mut index, ids) = filled(2);
        let before = index.rank_of(ids[1]).unwrap();
        IndexLayer::<u64>::rollback_insert(&mut index, ids[1], &1);
        assert_eq!(index.len(), 1);

        IndexLayer::<u64>::try_insert(&mut index, ids[1], &1).unwrap();
        assert_eq!(index.rank_of(ids[1]), Some(before));
    }

    #[test]
    fn restore_rejects_repeated_records() {
        let (nodes, index, ids) = filled(2);
        let rid = nodes.record_id(ids[0]).unwrap();
        let entries = vec![rank_entry(1, rid), rank_entry(2, rid)];
        let resolve = |r: RecordId| nodes.iter().find(|(_, rid, _)| *rid == r).map(|(id, _, _)| id);

        let mut fresh = SequencedIndex::new(index.name.clone());
        assert!(IndexLayer::<u64>::restore(&mut fresh, entries, &nodes, &resolve).is_err());
    }
}
