//! Node storage.
//!
//! The [`NodeStore`] owns every live record. Index layers only hold
//! [`NodeId`] handles into it. A handle carries the generation of its slot,
//! so a handle kept past `deallocate` never aliases the node that later
//! reuses the slot.

use crate::error::AllocationError;
use std::fmt;

/// Handle to a node in a [`NodeStore`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Returns the slot generation the handle was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@{})", self.slot, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.slot, self.generation)
    }
}

/// Persistent identity of a record.
///
/// Assigned once at insert, never reused within one store, and used as the
/// key of the record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Big-endian bytes, so byte order matches numeric order.
    #[inline]
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parses big-endian bytes. Returns `None` unless exactly 8 bytes.
    #[must_use]
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node<V> {
    record_id: RecordId,
    value: V,
}

#[derive(Debug, Clone)]
struct Slot<V> {
    generation: u32,
    node: Option<Node<V>>,
}

/// Slab of nodes with a free list.
#[derive(Debug)]
pub struct NodeStore<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    len: usize,
    max_nodes: usize,
}

impl<V> NodeStore<V> {
    /// Creates an empty store that holds at most `max_nodes` nodes.
    #[must_use]
    pub fn new(max_nodes: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            max_nodes,
        }
    }

    /// Takes ownership of `value` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] when the store is full or memory for a
    /// new slot cannot be reserved. The value is dropped in that case.
    pub fn allocate(&mut self, record_id: RecordId, value: V) -> Result<NodeId, AllocationError> {
        if self.len >= self.max_nodes {
            return Err(AllocationError::CapacityExceeded {
                max: self.max_nodes,
            });
        }

        let node = Node { record_id, value };
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.node = Some(node);
            self.len += 1;
            return Ok(NodeId {
                slot,
                generation: entry.generation,
            });
        }

        let slot = u32::try_from(self.slots.len()).map_err(|_| {
            AllocationError::CapacityExceeded {
                max: u32::MAX as usize,
            }
        })?;
        self.slots
            .try_reserve(1)
            .map_err(|_| AllocationError::OutOfMemory)?;
        // The free list must be able to take every slot back without
        // allocating, since deallocate cannot fail.
        self.free
            .try_reserve(self.slots.len() + 1 - self.free.len())
            .map_err(|_| AllocationError::OutOfMemory)?;

        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        self.len += 1;
        Ok(NodeId {
            slot,
            generation: 0,
        })
    }

    /// Destroys a node and hands its value back.
    ///
    /// Returns `None` for a stale or unknown handle.
    pub fn deallocate(&mut self, id: NodeId) -> Option<V> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let node = entry.node.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.len -= 1;
        Some(node.value)
    }

    fn node(&self, id: NodeId) -> Option<&Node<V>> {
        self.slots
            .get(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_ref())
    }

    /// Returns the value behind a handle.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&V> {
        self.node(id).map(|node| &node.value)
    }

    /// Returns the value behind a handle for in-place mutation.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut V> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_mut())
            .map(|node| &mut node.value)
    }

    /// Returns the record id of a node.
    #[must_use]
    pub fn record_id(&self, id: NodeId) -> Option<RecordId> {
        self.node(id).map(|node| node.record_id)
    }

    /// Returns true if the handle refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Configured node limit.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_nodes
    }

    /// Changes the node limit. Live nodes above the limit stay; only new
    /// allocations are refused.
    pub fn set_max_size(&mut self, max_nodes: usize) {
        self.max_nodes = max_nodes;
    }

    /// Iterates over live nodes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, RecordId, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry.node.as_ref().map(|node| {
                (
                    NodeId {
                        slot: slot as u32,
                        generation: entry.generation,
                    },
                    node.record_id,
                    &node.value,
                )
            })
        })
    }

    /// Destroys every node. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if entry.node.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(slot as u32);
            }
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_get() {
        let mut store = NodeStore::new(8);
        let a = store.allocate(RecordId(1), "a").unwrap();
        let b = store.allocate(RecordId(2), "b").unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a), Some(&"a"));
        assert_eq!(store.record_id(b), Some(RecordId(2)));
    }

    #[test]
    fn stale_handles_do_not_alias() {
        let mut store = NodeStore::new(8);
        let a = store.allocate(RecordId(1), "a").unwrap();
        assert_eq!(store.deallocate(a), Some("a"));
        assert_eq!(store.deallocate(a), None);

        let b = store.allocate(RecordId(2), "b").unwrap();
        assert_eq!(a.slot(), b.slot());
        assert_ne!(a, b);
        assert_eq!(store.get(a), None);
        assert_eq!(store.get(b), Some(&"b"));
    }

    #[test]
    fn limit_is_enforced() {
        let mut store = NodeStore::new(2);
        store.allocate(RecordId(1), 1).unwrap();
        let b = store.allocate(RecordId(2), 2).unwrap();
        assert_eq!(
            store.allocate(RecordId(3), 3),
            Err(AllocationError::CapacityExceeded { max: 2 })
        );

        store.deallocate(b);
        assert!(store.allocate(RecordId(3), 3).is_ok());
    }

    #[test]
    fn clear_invalidates_handles() {
        let mut store = NodeStore::new(8);
        let ids: Vec<NodeId> = (0..4)
            .map(|i| store.allocate(RecordId(i), i).unwrap())
            .collect();
        store.clear();

        assert!(store.is_empty());
        assert!(ids.iter().all(|id| !store.contains(*id)));
        assert_eq!(store.iter().count(), 0);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut store = NodeStore::new(8);
        let a = store.allocate(RecordId(7), String::from("old")).unwrap();
        store.get_mut(a).unwrap().push_str("er");
        assert_eq!(store.get(a).map(String::as_str), Some("older"));

        let all: Vec<_> = store.iter().map(|(id, rid, _)| (id, rid)).collect();
        assert_eq!(all, vec![(a, RecordId(7))]);
    }

    #[test]
    fn record_id_bytes() {
        let rid = RecordId(258);
        assert_eq!(RecordId::from_be_slice(&rid.to_be_bytes()), Some(rid));
        assert_eq!(RecordId::from_be_slice(&[1, 2, 3]), None);
        assert!(RecordId(1).to_be_bytes() < RecordId(256).to_be_bytes());
    }
}
