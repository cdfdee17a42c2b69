//! Index specifier lists.

use super::{
    HashedIndex, IndexKey, IndexLayer, OrderedIndex, RandomAccessIndex, SequencedIndex,
};
use crate::config::ContainerConfig;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use layerdb_kv::{ColumnDescriptor, ColumnOptions};
use std::collections::HashSet;
use std::fmt;

/// The ordered list of layers a container is built from.
///
/// List order is the order in which layers are tried, committed and loaded;
/// rollback runs in exact reverse.
///
/// # Example
///
/// ```rust
/// use layerdb_core::IndexSpecifierList;
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// # struct Account { id: u64, name: String, balance: u64 }
///
/// let specs = IndexSpecifierList::<Account>::new()
///     .hashed_unique("by_id", |a: &Account| a.id)
///     .ordered_unique("by_name", |a: &Account| a.name.clone())
///     .ordered_non_unique("by_balance", |a: &Account| a.balance)
///     .sequenced("arrival");
/// assert_eq!(specs.names(), vec!["by_id", "by_name", "by_balance", "arrival"]);
/// ```
pub struct IndexSpecifierList<V: Record> {
    layers: Vec<Box<dyn IndexLayer<V>>>,
}

impl<V: Record> Default for IndexSpecifierList<V> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<V: Record> IndexSpecifierList<V> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ordered layer that refuses duplicate keys.
    #[must_use]
    pub fn ordered_unique<K: IndexKey>(
        self,
        name: impl Into<String>,
        extract: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Self {
        self.with_layer(Box::new(OrderedIndex::new(name, true, extract)))
    }

    /// Appends an ordered layer that allows duplicate keys.
    #[must_use]
    pub fn ordered_non_unique<K: IndexKey>(
        self,
        name: impl Into<String>,
        extract: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Self {
        self.with_layer(Box::new(OrderedIndex::new(name, false, extract)))
    }

    /// Appends a hashed layer that refuses duplicate keys.
    #[must_use]
    pub fn hashed_unique<K: IndexKey>(
        self,
        name: impl Into<String>,
        extract: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Self {
        self.with_layer(Box::new(HashedIndex::new(name, true, extract)))
    }

    /// Appends a hashed layer that allows duplicate keys.
    #[must_use]
    pub fn hashed_non_unique<K: IndexKey>(
        self,
        name: impl Into<String>,
        extract: impl Fn(&V) -> K + Send + Sync + 'static,
    ) -> Self {
        self.with_layer(Box::new(HashedIndex::new(name, false, extract)))
    }

    /// Appends a layer in insertion order.
    #[must_use]
    pub fn sequenced(self, name: impl Into<String>) -> Self {
        self.with_layer(Box::new(SequencedIndex::new(name)))
    }

    /// Appends a layer with dense positional access.
    #[must_use]
    pub fn random_access(self, name: impl Into<String>) -> Self {
        self.with_layer(Box::new(RandomAccessIndex::new(name)))
    }

    /// Appends any layer, including caller-defined ones.
    #[must_use]
    pub fn with_layer(mut self, layer: Box<dyn IndexLayer<V>>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true if no layer was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names in list order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// The column families a store must be opened with to hold a container
    /// built from this list: the base column first, then one per layer.
    #[must_use]
    pub fn column_descriptors(&self, config: &ContainerConfig) -> Vec<ColumnDescriptor> {
        descriptors(config, &self.layers)
    }

    /// Checks names and hands the layers over.
    pub(crate) fn into_layers(self) -> CoreResult<Vec<Box<dyn IndexLayer<V>>>> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.name().is_empty() {
                return Err(CoreError::invalid_operation("layer names must not be empty"));
            }
            if !seen.insert(layer.name()) {
                return Err(CoreError::invalid_operation(format!(
                    "duplicate layer name {}",
                    layer.name()
                )));
            }
            if !layer.is_empty() {
                return Err(CoreError::invalid_operation(format!(
                    "layer {} is not empty",
                    layer.name()
                )));
            }
        }
        Ok(self.layers)
    }
}

impl<V: Record> fmt::Debug for IndexSpecifierList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|l| (l.name().to_string(), l.kind())))
            .finish()
    }
}

/// Base column plus one column per layer.
pub(crate) fn descriptors<V: Record>(
    config: &ContainerConfig,
    layers: &[Box<dyn IndexLayer<V>>],
) -> Vec<ColumnDescriptor> {
    let mut out = Vec::with_capacity(layers.len() + 1);
    out.push(ColumnDescriptor::new(config.name.clone()).with_options(ColumnOptions::default()));
    out.extend(layers.iter().map(|layer| {
        ColumnDescriptor::new(config.layer_column(layer.name()))
            .with_options(layer.column_options())
    }));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    type Pair = (u64, String);

    #[test]
    fn descriptors_follow_list_order() {
        let specs = IndexSpecifierList::<Pair>::new()
            .ordered_unique("by_name", |p: &Pair| p.1.clone())
            .random_access("pos");
        let config = ContainerConfig::new().name("pairs");
        let names: Vec<String> = specs
            .column_descriptors(&config)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["pairs", "pairs.by_name", "pairs.pos"]);
    }

    #[test]
    fn duplicate_names_are_refused() {
        let specs = IndexSpecifierList::<Pair>::new()
            .sequenced("a")
            .hashed_unique("a", |p: &Pair| p.0);
        assert!(matches!(
            specs.into_layers(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn empty_names_are_refused() {
        let specs = IndexSpecifierList::<Pair>::new().sequenced("");
        assert!(specs.into_layers().is_err());
    }
}
