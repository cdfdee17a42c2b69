//! Hashed layers.

use super::keyed::{BucketMap, KeyedIndex};
use super::{IndexKey, IndexKind};
use crate::node::NodeId;
use std::collections::HashMap;

/// A layer hashed by an extracted key, for O(1) equality lookups.
///
/// Iteration order across keys is unspecified; nodes sharing a key keep the
/// order in which they took it.
pub type HashedIndex<V, K> = KeyedIndex<V, K, HashMap<K, Vec<NodeId>>>;

impl<K: IndexKey> BucketMap<K> for HashMap<K, Vec<NodeId>> {
    const KIND: IndexKind = IndexKind::Hashed;

    fn bucket(&self, key: &K) -> Option<&Vec<NodeId>> {
        self.get(key)
    }

    fn bucket_mut(&mut self, key: &K) -> Option<&mut Vec<NodeId>> {
        self.get_mut(key)
    }

    fn bucket_or_insert(&mut self, key: K) -> &mut Vec<NodeId> {
        self.entry(key).or_default()
    }

    fn remove_bucket(&mut self, key: &K) {
        self.remove(key);
    }

    fn clear_buckets(&mut self) {
        self.clear();
    }

    fn bucket_count(&self) -> usize {
        self.len()
    }

    fn buckets(&self) -> Box<dyn Iterator<Item = (&K, &Vec<NodeId>)> + '_> {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::CopyMap;
    use crate::error::ConflictKind;
    use crate::index::IndexLayer;
    use crate::node::{NodeStore, RecordId};

    type Pair = (u64, String);

    #[test]
    fn lookup_by_key() {
        let mut nodes = NodeStore::new(8);
        let mut index: HashedIndex<Pair, u64> = HashedIndex::new("by_id", true, |p: &Pair| p.0);
        let a = nodes.allocate(RecordId(1), (10, "a".into())).unwrap();
        let b = nodes.allocate(RecordId(2), (20, "b".into())).unwrap();
        index.try_insert(a, nodes.get(a).unwrap()).unwrap();
        index.try_insert(b, nodes.get(b).unwrap()).unwrap();

        assert_eq!(index.find(&10), Some(a));
        assert!(index.contains(&20));
        assert_eq!(index.count(&30), 0);
        assert_eq!(index.kind(), IndexKind::Hashed);

        let c = nodes.allocate(RecordId(3), (20, "c".into())).unwrap();
        assert_eq!(
            index.try_insert(c, nodes.get(c).unwrap()),
            Err(ConflictKind::DuplicateKey)
        );
    }

    #[test]
    fn insert_rollback_leaves_no_trace() {
        let mut nodes = NodeStore::new(8);
        let mut index: HashedIndex<Pair, String> =
            HashedIndex::new("by_name", false, |p: &Pair| p.1.clone());
        let a = nodes.allocate(RecordId(1), (1, "a".into())).unwrap();
        index.try_insert(a, nodes.get(a).unwrap()).unwrap();
        index.rollback_insert(a, nodes.get(a).unwrap());

        assert!(index.is_empty());
        assert_eq!(index.distinct_keys(), 0);
    }

    #[test]
    fn clone_translates_every_handle() {
        let mut nodes = NodeStore::new(8);
        let mut index: HashedIndex<Pair, String> =
            HashedIndex::new("by_name", false, |p: &Pair| p.1.clone());
        let mut map = CopyMap::new();
        let mut copies = NodeStore::new(8);
        for i in 0..3u64 {
            let value = (i, "same".to_string());
            let id = nodes.allocate(RecordId(i), value.clone()).unwrap();
            index.try_insert(id, nodes.get(id).unwrap()).unwrap();
            // Offset the copies so old and new handles differ.
            copies.allocate(RecordId(100 + i), value.clone()).unwrap();
            map.insert(id, copies.allocate(RecordId(i), value).unwrap());
        }

        let cloned = index.clone_with(&map).unwrap();
        let cloned = cloned
            .as_any()
            .downcast_ref::<HashedIndex<Pair, String>>()
            .unwrap();
        let expected: Vec<NodeId> = index
            .equal_range(&"same".to_string())
            .iter()
            .map(|id| map.get(*id).unwrap())
            .collect();
        assert_eq!(cloned.equal_range(&"same".to_string()), expected.as_slice());
    }
}
