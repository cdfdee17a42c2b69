//! The multi-index container.
//!
//! [`MultiIndexContainer`] owns the node store, the layer chain and the
//! optional persistent adapter, and coordinates every mutation across them.

use crate::config::ContainerConfig;
use crate::copy::{clone_layers, clone_nodes};
use crate::error::{ConflictKind, CoreError, CoreResult};
use crate::index::{descriptors, rank_entry, IndexLayer, IndexSpecifierList, SequencedIndex};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::persist::{parse_payload_key, payload_key, PersistentAdapter, NEXT_ID_KEY};
use crate::record::{self, Record};
use crate::snapshot::{read_snapshot, write_snapshot};
use layerdb_kv::KvEngine;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, warn};

type Layers<V> = Vec<Box<dyn IndexLayer<V>>>;

/// A collection of records reachable through several index layers at once.
///
/// Every mutation is all-or-nothing across layers: when a layer refuses,
/// the layers that already accepted are rolled back in reverse order and
/// the container is left as it was. A persistent container also stages the
/// payload and every layer's column entries, then flushes them as one batch.
///
/// # Example
///
/// ```rust
/// use layerdb_core::{ContainerConfig, IndexSpecifierList, MultiIndexContainer, OrderedIndex};
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// # struct Item { id: u64, key: String }
///
/// let specs = IndexSpecifierList::new().ordered_unique("by_key", |i: &Item| i.key.clone());
/// let mut items = MultiIndexContainer::new(specs, ContainerConfig::default()).unwrap();
///
/// items.insert(Item { id: 1, key: "a".into() }).unwrap();
/// assert!(items.insert(Item { id: 3, key: "a".into() }).unwrap_err().is_conflict());
///
/// let by_key = items.index::<OrderedIndex<Item, String>>(0).unwrap();
/// assert_eq!(by_key.len(), 1);
/// ```
pub struct MultiIndexContainer<V: Record> {
    config: ContainerConfig,
    nodes: NodeStore<V>,
    layers: Layers<V>,
    by_record: HashMap<RecordId, NodeId>,
    next_record: u64,
    store: Option<PersistentAdapter>,
    poisoned: bool,
}

impl<V: Record> MultiIndexContainer<V> {
    /// Creates an empty container that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if layer names are empty or
    /// repeated.
    pub fn new(specs: IndexSpecifierList<V>, config: ContainerConfig) -> CoreResult<Self> {
        let layers = specs.into_layers()?;
        Ok(Self {
            nodes: NodeStore::new(config.max_nodes),
            layers,
            by_record: HashMap::new(),
            next_record: 0,
            store: None,
            poisoned: false,
            config,
        })
    }

    /// Opens a persistent container, rebuilding every layer from its
    /// column family.
    ///
    /// The engine must have been opened with
    /// [`IndexSpecifierList::column_descriptors`] for the same list and
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if a column family is missing,
    /// [`CoreError::Codec`] for an undecodable payload, or
    /// [`CoreError::InvalidFormat`] if a layer's column disagrees with the
    /// payloads.
    pub fn open(
        engine: Arc<dyn KvEngine>,
        specs: IndexSpecifierList<V>,
        config: ContainerConfig,
    ) -> CoreResult<Self> {
        let mut container = Self::new(specs, config)?;
        let store = container.attach(engine)?;

        let by_record = &container.by_record;
        let resolve = |record: RecordId| by_record.get(&record).copied();
        for (i, layer) in container.layers.iter_mut().enumerate() {
            let entries = store.scan(i + 1)?;
            layer.restore(entries, &container.nodes, &resolve)?;
        }

        container.finish_open(store)
    }

    /// Opens a persistent container whose layer structure comes from a
    /// snapshot written by [`MultiIndexContainer::save_snapshot`].
    ///
    /// Payloads are still read from the base column family.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the snapshot is corrupt,
    /// does not match the layer list, or is out of date with the layer
    /// columns, and the errors of
    /// [`MultiIndexContainer::open`].
    pub fn open_with_snapshot(
        engine: Arc<dyn KvEngine>,
        specs: IndexSpecifierList<V>,
        config: ContainerConfig,
        snapshot: &mut impl Read,
    ) -> CoreResult<Self> {
        let mut data = Vec::new();
        snapshot.read_to_end(&mut data)?;

        let mut container = Self::new(specs, config)?;
        let store = container.attach(engine)?;

        let by_record = &container.by_record;
        let resolve = |record: RecordId| by_record.get(&record).copied();
        read_snapshot(&data, &mut container.layers, &container.nodes, &resolve)?;
        container.match_columns(&store)?;

        container.finish_open(store)
    }

    /// Compares every layer's entries with the entries its column holds.
    fn match_columns(&self, store: &PersistentAdapter) -> CoreResult<()> {
        for (i, layer) in self.layers.iter().enumerate() {
            let mut expected: Vec<(Vec<u8>, Vec<u8>)> = self
                .nodes
                .iter()
                .filter_map(|(node, record, value)| layer.column_entry(node, record, value))
                .collect();
            expected.sort_unstable();
            let mut stored = store.scan(i + 1)?;
            stored.sort_unstable();
            if expected != stored {
                return Err(CoreError::invalid_format(format!(
                    "snapshot layer {} does not match its column family",
                    layer.name()
                )));
            }
        }
        Ok(())
    }

    /// Opens the adapter and loads every payload from the base column.
    fn attach(&mut self, engine: Arc<dyn KvEngine>) -> CoreResult<PersistentAdapter> {
        let descs = descriptors(&self.config, &self.layers);
        let store = PersistentAdapter::open(engine, &descs)?;

        let mut stored_next = 0;
        let mut seen_next = 0;
        for (key, value) in store.scan(0)? {
            if key.as_slice() == NEXT_ID_KEY {
                stored_next = RecordId::from_be_slice(&value)
                    .map(RecordId::as_u64)
                    .ok_or_else(|| CoreError::invalid_format("next record id is not 8 bytes"))?;
                continue;
            }
            let record = parse_payload_key(&key).ok_or_else(|| {
                CoreError::invalid_format(format!(
                    "unexpected key {key:02x?} in column {}",
                    self.config.name
                ))
            })?;
            let value = record::decode::<V>(&value)?;
            let node = self.nodes.allocate(record, value)?;
            self.by_record.insert(record, node);
            seen_next = seen_next.max(record.as_u64() + 1);
        }
        self.next_record = stored_next.max(seen_next);
        Ok(store)
    }

    fn finish_open(mut self, store: PersistentAdapter) -> CoreResult<Self> {
        if self.config.verify_invariants {
            self.verify()?;
        }
        debug!(
            container = %self.config.name,
            records = self.nodes.len(),
            layers = self.layers.len(),
            "opened container"
        );
        self.store = Some(store);
        Ok(self)
    }

    fn check_writable(&self) -> CoreResult<()> {
        if self.poisoned {
            return Err(CoreError::Poisoned);
        }
        Ok(())
    }

    /// Inserts a record, returning its node handle.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Codec`] if the payload cannot be encoded
    /// - [`CoreError::Allocation`] if the node store is full
    /// - [`CoreError::Conflict`] if a unique layer already holds the key
    /// - [`CoreError::Store`] if the automatic flush fails
    ///
    /// In the first three cases nothing was changed.
    pub fn insert(&mut self, value: V) -> CoreResult<NodeId> {
        self.check_writable()?;
        let payload = record::encode(&value)?;
        let record = RecordId(self.next_record);
        let node = self.nodes.allocate(record, value)?;

        let value = self
            .nodes
            .get(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        if let Err(err) = insert_into_layers(&mut self.layers, node, value) {
            self.nodes.deallocate(node);
            warn!(container = %self.config.name, error = %err, "insert rolled back");
            return Err(err);
        }

        self.next_record += 1;
        self.by_record.insert(record, node);
        if let Some(store) = self.store.as_mut() {
            store.put(0, payload_key(record), payload)?;
            put_entries(store, &self.layers, node, record, value)?;
            store.put(0, NEXT_ID_KEY.to_vec(), self.next_record.to_be_bytes().to_vec())?;
        }
        self.maybe_flush()?;
        Ok(node)
    }

    /// Applies `f` to a record and re-keys it in every layer.
    ///
    /// On any failure the record keeps its old value and its place in every
    /// layer.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NodeNotFound`] for a stale handle
    /// - [`CoreError::Codec`] if the new value cannot be encoded
    /// - [`CoreError::Conflict`] if a unique layer already holds the new key
    /// - [`CoreError::Store`] if the automatic flush fails
    pub fn modify(&mut self, node: NodeId, f: impl FnOnce(&mut V)) -> CoreResult<()> {
        self.check_writable()?;
        let record = self
            .nodes
            .record_id(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        let old = self
            .nodes
            .get(node)
            .ok_or(CoreError::NodeNotFound { node })?
            .clone();
        let old_entries: Vec<_> = if self.store.is_some() {
            self.layers
                .iter()
                .map(|layer| layer.column_entry(node, record, &old))
                .collect()
        } else {
            Vec::new()
        };

        if let Some(value) = self.nodes.get_mut(node) {
            f(value);
        }
        let encoded = match self.nodes.get(node) {
            Some(new) => record::encode(new),
            None => return Err(CoreError::NodeNotFound { node }),
        };
        let payload = match encoded {
            Ok(payload) => payload,
            Err(err) => {
                self.put_back(node, old);
                return Err(err);
            }
        };

        let result = match self.nodes.get(node) {
            Some(new) => modify_in_layers(&mut self.layers, node, &old, new),
            None => return Err(CoreError::NodeNotFound { node }),
        };
        if let Err(err) = result {
            warn!(container = %self.config.name, error = %err, "modify rolled back");
            self.put_back(node, old);
            return Err(err);
        }

        if let (Some(store), Some(new)) = (self.store.as_mut(), self.nodes.get(node)) {
            store.put(0, payload_key(record), payload)?;
            for (i, (layer, before)) in self.layers.iter().zip(old_entries).enumerate() {
                let after = layer.column_entry(node, record, new);
                if before == after {
                    continue;
                }
                if let Some((old_key, _)) = before {
                    if after.as_ref().map(|(key, _)| key) != Some(&old_key) {
                        store.delete(i + 1, old_key)?;
                    }
                }
                if let Some((key, value)) = after {
                    store.put(i + 1, key, value)?;
                }
            }
        }
        self.maybe_flush()
    }

    /// Replaces a record with a complete new value.
    ///
    /// # Errors
    ///
    /// Same as [`MultiIndexContainer::modify`].
    pub fn replace(&mut self, node: NodeId, value: V) -> CoreResult<()> {
        self.modify(node, move |slot| *slot = value)
    }

    fn put_back(&mut self, node: NodeId, old: V) {
        if let Some(slot) = self.nodes.get_mut(node) {
            *slot = old;
        }
    }

    /// Removes a record from every layer and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] for a stale handle, or
    /// [`CoreError::Store`] if the automatic flush fails.
    pub fn erase(&mut self, node: NodeId) -> CoreResult<V> {
        self.check_writable()?;
        let record = self
            .nodes
            .record_id(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        let value = self
            .nodes
            .get(node)
            .ok_or(CoreError::NodeNotFound { node })?;

        if let Some(store) = self.store.as_mut() {
            store.delete(0, payload_key(record))?;
            for (i, layer) in self.layers.iter().enumerate() {
                if let Some((key, _)) = layer.column_entry(node, record, value) {
                    store.delete(i + 1, key)?;
                }
            }
        }
        for layer in self.layers.iter_mut().rev() {
            layer.erase(node, value);
        }

        let value = self
            .nodes
            .deallocate(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        self.by_record.remove(&record);
        self.maybe_flush()?;
        Ok(value)
    }

    /// Removes every record. The next record id is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the store cannot be read for the
    /// per-key fallback or the automatic flush fails.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        self.stage_wipe()?;
        for layer in &mut self.layers {
            layer.clear();
        }
        self.nodes.clear();
        self.by_record.clear();
        debug!(container = %self.config.name, "cleared container");
        self.maybe_flush()
    }

    /// Exchanges the contents of two containers with the same layer layout.
    ///
    /// Each container keeps its own configuration and store; both stores
    /// are rewritten to hold the swapped contents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the layouts differ, or a
    /// store error from either side.
    pub fn swap(&mut self, other: &mut Self) -> CoreResult<()> {
        self.check_writable()?;
        other.check_writable()?;
        let same_layout = self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| a.name() == b.name() && a.kind() == b.kind());
        if !same_layout {
            return Err(CoreError::invalid_operation(
                "cannot swap containers with different layers",
            ));
        }

        self.stage_wipe()?;
        other.stage_wipe()?;
        std::mem::swap(&mut self.nodes, &mut other.nodes);
        std::mem::swap(&mut self.layers, &mut other.layers);
        std::mem::swap(&mut self.by_record, &mut other.by_record);
        let next = self.next_record.max(other.next_record);
        self.next_record = next;
        other.next_record = next;
        self.nodes.set_max_size(self.config.max_nodes);
        other.nodes.set_max_size(other.config.max_nodes);
        self.stage_all()?;
        other.stage_all()?;

        debug!(
            left = %self.config.name,
            right = %other.config.name,
            "swapped containers"
        );
        self.maybe_flush()?;
        other.maybe_flush()
    }

    /// Moves a record to the front of a sequenced layer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayerNotFound`], [`CoreError::LayerTypeMismatch`]
    /// if the layer is not sequenced, [`CoreError::NodeNotFound`], or a store
    /// error from the automatic flush.
    pub fn relocate_to_front(&mut self, layer: usize, node: NodeId) -> CoreResult<()> {
        self.relocate(layer, node, true)
    }

    /// Moves a record to the back of a sequenced layer.
    ///
    /// # Errors
    ///
    /// Same as [`MultiIndexContainer::relocate_to_front`].
    pub fn relocate_to_back(&mut self, layer: usize, node: NodeId) -> CoreResult<()> {
        self.relocate(layer, node, false)
    }

    fn relocate(&mut self, position: usize, node: NodeId, front: bool) -> CoreResult<()> {
        self.check_writable()?;
        let record = self
            .nodes
            .record_id(node)
            .ok_or(CoreError::NodeNotFound { node })?;
        let layer = self
            .layers
            .get_mut(position)
            .ok_or_else(|| CoreError::LayerNotFound {
                name: position.to_string(),
            })?;
        let name = layer.name().to_string();
        let sequenced = layer
            .as_any_mut()
            .downcast_mut::<SequencedIndex>()
            .ok_or(CoreError::LayerTypeMismatch { layer: name })?;
        let moved = if front {
            sequenced.relocate_to_front(node)
        } else {
            sequenced.relocate_to_back(node)
        };
        let (old, new) = moved.ok_or(CoreError::NodeNotFound { node })?;
        if old == new {
            return Ok(());
        }

        if let Some(store) = self.store.as_mut() {
            let (key, value) = rank_entry(new, record);
            store.delete(position + 1, old.to_be_bytes().to_vec())?;
            store.put(position + 1, key, value)?;
        }
        self.maybe_flush()
    }

    /// Writes every staged operation to the store as one batch.
    ///
    /// A no-op for a memory-only container.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if the write fails. The container is
    /// then poisoned: the staged operations are gone, the in-memory layers
    /// may be ahead of the store, and every later mutation returns
    /// [`CoreError::Poisoned`].
    pub fn flush(&mut self) -> CoreResult<()> {
        self.check_writable()?;
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        if let Err(err) = store.flush() {
            self.poisoned = true;
            warn!(container = %self.config.name, "flush failed, container poisoned");
            return Err(err.into());
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> CoreResult<()> {
        if self.config.auto_flush {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Stages removal of everything this container has persisted.
    fn stage_wipe(&mut self) -> CoreResult<()> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        if store.supports_truncate() {
            for column in 0..store.column_count() {
                store.truncate(column)?;
            }
        } else {
            let mut keys: Vec<BTreeSet<Vec<u8>>> = vec![BTreeSet::new(); store.column_count()];
            for (column, set) in keys.iter_mut().enumerate() {
                set.extend(store.scan(column)?.into_iter().map(|(key, _)| key));
            }
            for (node, record, value) in self.nodes.iter() {
                keys[0].insert(payload_key(record));
                for (i, layer) in self.layers.iter().enumerate() {
                    if let Some((key, _)) = layer.column_entry(node, record, value) {
                        keys[i + 1].insert(key);
                    }
                }
            }
            keys[0].remove(NEXT_ID_KEY);
            for (column, set) in keys.into_iter().enumerate() {
                for key in set {
                    store.delete(column, key)?;
                }
            }
        }
        store.put(0, NEXT_ID_KEY.to_vec(), self.next_record.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Stages every record and layer entry.
    fn stage_all(&mut self) -> CoreResult<()> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        for (node, record, value) in self.nodes.iter() {
            store.put(0, payload_key(record), record::encode(value)?)?;
            put_entries(store, &self.layers, node, record, value)?;
        }
        store.put(0, NEXT_ID_KEY.to_vec(), self.next_record.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Returns a record.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&V> {
        self.nodes.get(node)
    }

    /// Returns true if the handle refers to a live record.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Returns the persistent id of a record.
    #[must_use]
    pub fn record_id(&self, node: NodeId) -> Option<RecordId> {
        self.nodes.record_id(node)
    }

    /// Finds the node holding a persistent record id.
    #[must_use]
    pub fn find_by_record_id(&self, record: RecordId) -> Option<NodeId> {
        self.by_record.get(&record).copied()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the container holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of records.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.nodes.max_size()
    }

    /// Layer names in list order.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Number of staged store operations.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.store.as_ref().map_or(0, PersistentAdapter::pending)
    }

    /// Returns true once a flush has failed.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns true if the container is backed by a store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// The configuration the container was built with.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Iterates over every record in node-store order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &V)> + '_ {
        self.nodes.iter().map(|(node, _, value)| (node, value))
    }

    /// Typed view of the layer at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayerNotFound`] or
    /// [`CoreError::LayerTypeMismatch`].
    pub fn index<I: 'static>(&self, position: usize) -> CoreResult<&I> {
        let layer = self
            .layers
            .get(position)
            .ok_or_else(|| CoreError::LayerNotFound {
                name: position.to_string(),
            })?;
        layer
            .as_any()
            .downcast_ref::<I>()
            .ok_or_else(|| CoreError::LayerTypeMismatch {
                layer: layer.name().to_string(),
            })
    }

    /// Typed view of the layer called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayerNotFound`] or
    /// [`CoreError::LayerTypeMismatch`].
    pub fn index_by_name<I: 'static>(&self, name: &str) -> CoreResult<&I> {
        let position = self
            .layers
            .iter()
            .position(|layer| layer.name() == name)
            .ok_or_else(|| CoreError::LayerNotFound {
                name: name.to_string(),
            })?;
        self.index(position)
    }

    /// Checks every layer's structure against the node store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] naming the first broken layer.
    pub fn verify(&self) -> CoreResult<()> {
        if self.by_record.len() != self.nodes.len() {
            return Err(CoreError::invalid_format(format!(
                "record map holds {} ids for {} records",
                self.by_record.len(),
                self.nodes.len()
            )));
        }
        for layer in &self.layers {
            if !layer.check_invariant(&self.nodes) {
                return Err(CoreError::invalid_format(format!(
                    "layer {} is inconsistent",
                    layer.name()
                )));
            }
        }
        Ok(())
    }

    /// Writes the structure of every layer. Payloads are not included.
    ///
    /// The snapshot only opens against a store in the same state, so flush
    /// first when automatic flushing is off.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from `out`.
    pub fn save_snapshot(&self, out: &mut impl Write) -> CoreResult<()> {
        let bytes = write_snapshot(&self.layers, &self.nodes)?;
        out.write_all(&bytes)?;
        debug!(
            container = %self.config.name,
            bytes = bytes.len(),
            "saved snapshot"
        );
        Ok(())
    }

    /// Builds a memory-only copy with the same configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Clone`] if the copy cannot be built. The source
    /// is never changed.
    pub fn try_clone(&self) -> CoreResult<Self> {
        self.clone_with_config(self.config.clone())
    }

    /// Builds a copy persisted in `engine` under `config`, written with one
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Clone`] if the copy cannot be built, or a store
    /// error if the engine lacks the column families or refuses the write.
    pub fn try_clone_into(
        &self,
        engine: Arc<dyn KvEngine>,
        config: ContainerConfig,
    ) -> CoreResult<Self> {
        let mut clone = self.clone_with_config(config)?;
        let descs = descriptors(&clone.config, &clone.layers);
        clone.store = Some(PersistentAdapter::open(engine, &descs)?);
        clone.stage_wipe()?;
        clone.stage_all()?;
        clone.flush()?;
        Ok(clone)
    }

    fn clone_with_config(&self, config: ContainerConfig) -> CoreResult<Self> {
        let (nodes, map) = clone_nodes(&self.nodes, config.max_nodes)?;
        let layers = clone_layers(&self.layers, &map)?;
        let by_record = nodes.iter().map(|(node, record, _)| (record, node)).collect();
        let clone = Self {
            config,
            nodes,
            layers,
            by_record,
            next_record: self.next_record,
            store: None,
            poisoned: false,
        };
        if clone.config.verify_invariants {
            clone.verify()?;
        }
        debug!(
            source = %self.config.name,
            container = %clone.config.name,
            records = clone.nodes.len(),
            "cloned container"
        );
        Ok(clone)
    }

    /// Destroys the container together with its column families.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] if a column family cannot be dropped.
    pub fn wipe(mut self) -> CoreResult<()> {
        for layer in &mut self.layers {
            layer.clear();
        }
        self.nodes.clear();
        self.by_record.clear();
        if let Some(store) = self.store.take() {
            store.destroy()?;
            debug!(container = %self.config.name, "wiped container");
        }
        Ok(())
    }
}

/// Two-phase insert across the chain.
fn insert_into_layers<V: Record>(
    layers: &mut [Box<dyn IndexLayer<V>>],
    node: NodeId,
    value: &V,
) -> CoreResult<()> {
    let failed = layers.iter_mut().enumerate().find_map(|(k, layer)| {
        layer
            .try_insert(node, value)
            .err()
            .map(|kind| (k, layer.name().to_string(), kind))
    });
    if let Some((k, name, kind)) = failed {
        for layer in layers[..k].iter_mut().rev() {
            layer.rollback_insert(node, value);
        }
        return Err(CoreError::conflict(name, kind));
    }
    for layer in layers.iter_mut() {
        layer.commit_insert(node, value);
    }
    Ok(())
}

/// Two-phase re-key across the chain.
fn modify_in_layers<V: Record>(
    layers: &mut [Box<dyn IndexLayer<V>>],
    node: NodeId,
    old: &V,
    new: &V,
) -> CoreResult<()> {
    let failed: Option<(usize, String, ConflictKind)> =
        layers.iter_mut().enumerate().find_map(|(k, layer)| {
            layer
                .try_modify(node, old, new)
                .err()
                .map(|kind| (k, layer.name().to_string(), kind))
        });
    if let Some((k, name, kind)) = failed {
        for layer in layers[..k].iter_mut().rev() {
            layer.rollback_modify(node, old, new);
        }
        return Err(CoreError::conflict(name, kind));
    }
    for layer in layers.iter_mut() {
        layer.commit_modify(node, old, new);
    }
    Ok(())
}

fn put_entries<V: Record>(
    store: &mut PersistentAdapter,
    layers: &[Box<dyn IndexLayer<V>>],
    node: NodeId,
    record: RecordId,
    value: &V,
) -> CoreResult<()> {
    for (i, layer) in layers.iter().enumerate() {
        if let Some((key, entry)) = layer.column_entry(node, record, value) {
            store.put(i + 1, key, entry)?;
        }
    }
    Ok(())
}

impl<V: Record> fmt::Debug for MultiIndexContainer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiIndexContainer")
            .field("name", &self.config.name)
            .field("len", &self.nodes.len())
            .field("layers", &self.layer_names())
            .field("persistent", &self.store.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
