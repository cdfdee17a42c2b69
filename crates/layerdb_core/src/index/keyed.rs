//! Layers keyed by a value extracted from each record.

use super::{
    bad_entry, check_count, resolve_record, resolve_value, IndexKey, IndexKind, IndexLayer,
    Resolver,
};
use crate::copy::CopyMap;
use crate::error::{CloneError, ConflictKind, CoreError, CoreResult};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::record::Record;
use crate::snapshot::{SnapshotReader, SnapshotWriter};
use layerdb_kv::ColumnOptions;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Storage for the buckets of a keyed layer. Each bucket holds the nodes
/// sharing one key, in the order they joined it.
pub trait BucketMap<K>: Default + Send + Sync + 'static {
    /// Layer kind this storage gives.
    const KIND: IndexKind;

    /// Returns the bucket for `key`.
    fn bucket(&self, key: &K) -> Option<&Vec<NodeId>>;

    /// Returns the bucket for `key` for mutation.
    fn bucket_mut(&mut self, key: &K) -> Option<&mut Vec<NodeId>>;

    /// Returns the bucket for `key`, creating it empty if absent.
    fn bucket_or_insert(&mut self, key: K) -> &mut Vec<NodeId>;

    /// Removes a bucket.
    fn remove_bucket(&mut self, key: &K);

    /// Removes every bucket.
    fn clear_buckets(&mut self);

    /// Number of distinct keys.
    fn bucket_count(&self) -> usize;

    /// Iterates over buckets in storage order.
    fn buckets(&self) -> Box<dyn Iterator<Item = (&K, &Vec<NodeId>)> + '_>;
}

type Extractor<V, K> = Arc<dyn Fn(&V) -> K + Send + Sync>;

/// A layer keyed by `extract(value)`.
///
/// Every node carries a join sequence number, taken when it enters a bucket.
/// Buckets are kept in sequence order, and the column entry key is
/// `key ++ seq` so a reopen rebuilds each bucket in the same order.
///
/// Use it through [`crate::OrderedIndex`] or [`crate::HashedIndex`].
pub struct KeyedIndex<V, K, M> {
    name: String,
    unique: bool,
    extract: Extractor<V, K>,
    entries: M,
    len: usize,
    options: ColumnOptions,
    seqs: HashMap<NodeId, u64>,
    next_seq: u64,
    /// Node moved by the last `try_modify`, with its position and sequence
    /// number in the old bucket.
    displaced: Option<(NodeId, usize, u64)>,
}

impl<V, K, M> KeyedIndex<V, K, M>
where
    V: Record,
    K: IndexKey,
    M: BucketMap<K>,
{
    /// Creates an empty layer.
    pub fn new(
        name: impl Into<String>,
        unique: bool,
        extract: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            unique,
            extract: Arc::new(extract),
            entries: M::default(),
            len: 0,
            options: ColumnOptions::default(),
            seqs: HashMap::new(),
            next_seq: 0,
            displaced: None,
        }
    }

    /// Sets the options of the layer's column family.
    #[must_use]
    pub fn with_column_options(mut self, options: ColumnOptions) -> Self {
        self.options = options;
        self
    }

    /// Extracts the key of a value.
    pub fn key_of(&self, value: &V) -> K {
        (self.extract)(value)
    }

    /// Returns the bucket storage.
    pub fn entries(&self) -> &M {
        &self.entries
    }

    /// Returns the first node with `key`.
    pub fn find(&self, key: &K) -> Option<NodeId> {
        self.entries.bucket(key).and_then(|b| b.first().copied())
    }

    /// Returns every node with `key`, in the order they took the key.
    pub fn equal_range(&self, key: &K) -> &[NodeId] {
        self.entries.bucket(key).map_or(&[], Vec::as_slice)
    }

    /// Number of nodes with `key`.
    pub fn count(&self, key: &K) -> usize {
        self.equal_range(key).len()
    }

    /// Returns true if any node has `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.bucket(key).is_some()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the layer holds no node.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys.
    pub fn distinct_keys(&self) -> usize {
        self.entries.bucket_count()
    }

    /// Iterates over nodes in layer order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries
            .buckets()
            .flat_map(|(_, bucket)| bucket.iter().copied())
    }

    /// Iterates over the key of every node in layer order, repeating a key
    /// once per node that has it.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries
            .buckets()
            .flat_map(|(key, bucket)| std::iter::repeat(key).take(bucket.len()))
    }

    /// Join sequence number of `node`, if it is in the layer.
    pub fn sequence_of(&self, node: NodeId) -> Option<u64> {
        self.seqs.get(&node).copied()
    }

    /// Appends `node` to the bucket of `key` under a fresh sequence number.
    fn link(&mut self, key: K, node: NodeId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.bucket_or_insert(key).push(node);
        self.seqs.insert(node, seq);
    }

    /// Removes `node` from the bucket of `key` and returns its position.
    fn unlink(&mut self, key: &K, node: NodeId) -> Option<usize> {
        let bucket = self.entries.bucket_mut(key)?;
        let pos = bucket.iter().rposition(|n| *n == node)?;
        bucket.remove(pos);
        if bucket.is_empty() {
            self.entries.remove_bucket(key);
        }
        Some(pos)
    }

    fn taken(&self, key: &K) -> bool {
        self.unique && self.entries.bucket(key).is_some_and(|b| !b.is_empty())
    }

    /// Appends a node read back from a snapshot or column family. Sequence
    /// numbers must rise within each bucket.
    fn insert_loaded(
        &mut self,
        node: NodeId,
        seq: u64,
        value: &V,
        seen: &mut HashSet<NodeId>,
    ) -> CoreResult<()> {
        if !seen.insert(node) {
            return Err(CoreError::invalid_format(format!(
                "layer {} lists node {node} twice",
                self.name
            )));
        }
        let key = self.key_of(value);
        if self.taken(&key) {
            return Err(CoreError::conflict(self.name.clone(), ConflictKind::DuplicateKey));
        }
        let last = self
            .entries
            .bucket(&key)
            .and_then(|bucket| bucket.last())
            .and_then(|last| self.seqs.get(last));
        if last.is_some_and(|last| *last >= seq) {
            return Err(CoreError::invalid_format(format!(
                "layer {} lists node {node} out of join order",
                self.name
            )));
        }
        self.entries.bucket_or_insert(key).push(node);
        self.seqs.insert(node, seq);
        self.next_seq = self.next_seq.max(seq.saturating_add(1));
        self.len += 1;
        Ok(())
    }
}

impl<V, K, M> IndexLayer<V> for KeyedIndex<V, K, M>
where
    V: Record,
    K: IndexKey,
    M: BucketMap<K>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        M::KIND
    }

    fn unique(&self) -> bool {
        self.unique
    }

    fn len(&self) -> usize {
        self.len
    }

    fn column_options(&self) -> ColumnOptions {
        self.options.clone()
    }

    fn try_insert(&mut self, node: NodeId, value: &V) -> Result<(), ConflictKind> {
        let key = self.key_of(value);
        if self.taken(&key) {
            return Err(ConflictKind::DuplicateKey);
        }
        self.link(key, node);
        self.len += 1;
        Ok(())
    }

    fn rollback_insert(&mut self, node: NodeId, value: &V) {
        self.erase(node, value);
    }

    fn erase(&mut self, node: NodeId, value: &V) {
        let key = self.key_of(value);
        if self.unlink(&key, node).is_some() {
            self.seqs.remove(&node);
            self.len -= 1;
        }
    }

    fn try_modify(&mut self, node: NodeId, old: &V, new: &V) -> Result<(), ConflictKind> {
        let old_key = self.key_of(old);
        let new_key = self.key_of(new);
        if old_key == new_key {
            return Ok(());
        }
        if self.taken(&new_key) {
            return Err(ConflictKind::DuplicateKey);
        }
        let pos = self.unlink(&old_key, node);
        let old_seq = self.seqs.get(&node).copied();
        self.link(new_key, node);
        self.displaced = pos.zip(old_seq).map(|(pos, seq)| (node, pos, seq));
        Ok(())
    }

    fn commit_modify(&mut self, _node: NodeId, _old: &V, _new: &V) {
        self.displaced = None;
    }

    fn rollback_modify(&mut self, node: NodeId, old: &V, new: &V) {
        let old_key = self.key_of(old);
        let new_key = self.key_of(new);
        if old_key == new_key {
            return;
        }
        self.unlink(&new_key, node);
        match self.displaced.take() {
            Some((moved, pos, seq)) if moved == node => {
                let bucket = self.entries.bucket_or_insert(old_key);
                let at = pos.min(bucket.len());
                bucket.insert(at, node);
                self.seqs.insert(node, seq);
            }
            _ => self.link(old_key, node),
        }
    }

    fn clear(&mut self) {
        self.entries.clear_buckets();
        self.seqs.clear();
        self.next_seq = 0;
        self.len = 0;
        self.displaced = None;
    }

    fn column_entry(&self, node: NodeId, record: RecordId, value: &V) -> Option<(Vec<u8>, Vec<u8>)> {
        let seq = self.seqs.get(&node)?;
        let mut key = self.key_of(value).to_bytes();
        key.extend_from_slice(&seq.to_be_bytes());
        Some((key, record.to_be_bytes().to_vec()))
    }

    fn save(&self, nodes: &NodeStore<V>, out: &mut SnapshotWriter) -> CoreResult<()> {
        out.put_u64(self.len as u64);
        for node in self.iter() {
            let record = nodes.record_id(node).ok_or(CoreError::NodeNotFound { node })?;
            let seq = self.seqs.get(&node).ok_or(CoreError::NodeNotFound { node })?;
            out.put_u64(*seq);
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
        let mut seen = HashSet::with_capacity(count);
        for _ in 0..count {
            let seq = input.u64()?;
            let node = resolve_record(&self.name, input.record()?, resolve)?;
            let value = nodes.get(node).ok_or(CoreError::NodeNotFound { node })?;
            self.insert_loaded(node, seq, value, &mut seen)?;
        }
        check_count(&self.name, self.len, nodes.len())
    }

    fn restore(
        &mut self,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        nodes: &NodeStore<V>,
        resolve: Resolver<'_>,
    ) -> CoreResult<()> {
        let mut joined = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(split) = key.len().checked_sub(8) else {
                return Err(bad_entry(&self.name, "key shorter than a sequence number"));
            };
            let (key_bytes, seq_bytes) = key.split_at(split);
            let seq = seq_bytes
                .try_into()
                .map(u64::from_be_bytes)
                .map_err(|_| bad_entry(&self.name, "truncated sequence number"))?;
            let node = resolve_value(&self.name, &value, resolve)?;
            let record = nodes.get(node).ok_or(CoreError::NodeNotFound { node })?;
            if K::from_bytes(key_bytes)? != self.key_of(record) {
                return Err(bad_entry(&self.name, "stored key does not match record"));
            }
            joined.push((seq, node, record));
        }

        // Column order follows key bytes; buckets follow join order.
        joined.sort_unstable_by_key(|(seq, _, _)| *seq);
        if joined.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(bad_entry(&self.name, "sequence number repeated"));
        }
        let mut seen = HashSet::with_capacity(joined.len());
        for (seq, node, record) in joined {
            self.insert_loaded(node, seq, record, &mut seen)?;
        }
        check_count(&self.name, self.len, nodes.len())
    }

    fn clone_with(&self, map: &CopyMap) -> Result<Box<dyn IndexLayer<V>>, CloneError> {
        let mut entries = M::default();
        for (key, bucket) in self.entries.buckets() {
            let translated = bucket
                .iter()
                .map(|node| map.translate(&self.name, *node))
                .collect::<Result<Vec<_>, _>>()?;
            *entries.bucket_or_insert(key.clone()) = translated;
        }
        let seqs = self
            .seqs
            .iter()
            .map(|(node, seq)| Ok((map.translate(&self.name, *node)?, *seq)))
            .collect::<Result<HashMap<_, _>, CloneError>>()?;
        Ok(Box::new(Self {
            name: self.name.clone(),
            unique: self.unique,
            extract: Arc::clone(&self.extract),
            entries,
            len: self.len,
            options: self.options.clone(),
            seqs,
            next_seq: self.next_seq,
            displaced: None,
        }))
    }

    fn check_invariant(&self, nodes: &NodeStore<V>) -> bool {
        let mut total = 0;
        for (key, bucket) in self.entries.buckets() {
            if bucket.is_empty() || (self.unique && bucket.len() > 1) {
                return false;
            }
            let mut last = None;
            for node in bucket {
                match nodes.get(*node) {
                    Some(value) if self.key_of(value) == *key => {}
                    _ => return false,
                }
                let Some(seq) = self.seqs.get(node) else {
                    return false;
                };
                if last.is_some_and(|last| last >= *seq) || *seq >= self.next_seq {
                    return false;
                }
                last = Some(*seq);
            }
            total += bucket.len();
        }
        total == self.len && self.len == nodes.len() && self.seqs.len() == self.len
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<V, K, M> fmt::Debug for KeyedIndex<V, K, M>
where
    K: IndexKey,
    M: BucketMap<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedIndex")
            .field("name", &self.name)
            .field("kind", &M::KIND)
            .field("unique", &self.unique)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
