//! Ordered layers.

use super::keyed::{BucketMap, KeyedIndex};
use super::{IndexKey, IndexKind};
use crate::node::NodeId;
use crate::record::Record;
use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};

/// A layer sorted by an extracted key, for ordered traversal and range
/// queries.
///
/// Nodes with equal keys (non-unique layers only) keep the order in which
/// they took the key.
///
/// # Example
///
/// ```rust,ignore
/// let by_balance = container.index::<OrderedIndex<Account, u64>>(1)?;
/// let rich: Vec<NodeId> = by_balance.range(1_000..).collect();
/// ```
pub type OrderedIndex<V, K> = KeyedIndex<V, K, BTreeMap<K, Vec<NodeId>>>;

impl<K: IndexKey> BucketMap<K> for BTreeMap<K, Vec<NodeId>> {
    const KIND: IndexKind = IndexKind::Ordered;

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

impl<V: Record, K: IndexKey> KeyedIndex<V, K, BTreeMap<K, Vec<NodeId>>> {
    /// Returns nodes whose keys fall in `range`, in key order.
    pub fn range<R>(&self, range: R) -> impl Iterator<Item = NodeId> + '_
    where
        R: RangeBounds<K>,
    {
        self.entries()
            .range(range)
            .flat_map(|(_, bucket)| bucket.iter().copied())
    }

    /// Returns the first node whose key is not less than `key`.
    pub fn lower_bound(&self, key: &K) -> Option<NodeId> {
        self.range((Bound::Included(key.clone()), Bound::Unbounded))
            .next()
    }

    /// Returns the first node whose key is greater than `key`.
    pub fn upper_bound(&self, key: &K) -> Option<NodeId> {
        self.range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
    }

    /// Returns the node with the smallest key.
    pub fn first(&self) -> Option<NodeId> {
        self.entries()
            .values()
            .next()
            .and_then(|bucket| bucket.first().copied())
    }

    /// Returns the node with the largest key.
    pub fn last(&self) -> Option<NodeId> {
        self.entries()
            .values()
            .next_back()
            .and_then(|bucket| bucket.last().copied())
    }

    /// Iterates over nodes from the largest key down.
    pub fn iter_rev(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries()
            .values()
            .rev()
            .flat_map(|bucket| bucket.iter().rev().copied())
    }

    /// Returns the smallest key.
    pub fn min_key(&self) -> Option<&K> {
        self.entries().keys().next()
    }

    /// Returns the largest key.
    pub fn max_key(&self) -> Option<&K> {
        self.entries().keys().next_back()
    }
}
