//! The engine contract consumed by LayerDB containers.

use crate::batch::WriteBatch;
use crate::column::{ColumnHandle, EngineId};
use crate::error::KvResult;

/// An embedded ordered key-value store with column families.
///
/// Any store that meets this contract can sit underneath a container:
///
/// - column families are fixed when the engine opens
/// - `write` applies a whole batch or nothing
/// - `scan` yields a column family's entries in bytewise key order
///
/// Engines are shared behind `Arc<dyn KvEngine>` and synchronize
/// internally.
pub trait KvEngine: Send + Sync {
    /// Returns the identity of this engine instance.
    fn id(&self) -> EngineId;

    /// Opens a handle to a declared column family.
    ///
    /// # Errors
    ///
    /// Returns [`crate::KvError::UnknownColumnFamily`] if the name was not
    /// declared at open time or has been dropped.
    fn column_family(&self, name: &str) -> KvResult<ColumnHandle>;

    /// Returns the names of every live column family, sorted.
    fn column_family_names(&self) -> Vec<String>;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign or its column family was
    /// dropped.
    fn get(&self, cf: &ColumnHandle, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Returns every entry of a column family in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign or its column family was
    /// dropped.
    fn scan(&self, cf: &ColumnHandle) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Returns the number of keys in a column family.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign or its column family was
    /// dropped.
    fn len(&self, cf: &ColumnHandle) -> KvResult<usize>;

    /// Applies a batch atomically.
    ///
    /// On error nothing from the batch is visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch references a foreign engine, an unknown
    /// column family, breaks a column option, or the write fails.
    fn write(&self, batch: WriteBatch) -> KvResult<()>;

    /// Drops a column family and every key in it, consuming the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is foreign or the drop cannot be
    /// recorded.
    fn drop_column_family(&self, cf: ColumnHandle) -> KvResult<()>;

    /// Whether [`WriteBatch::truncate`] is honoured.
    ///
    /// Callers fall back to per-key deletes when this returns false.
    fn supports_truncate(&self) -> bool {
        true
    }

    /// Returns the number of handles issued and not yet released.
    fn live_handles(&self) -> usize;

    /// Makes every applied batch durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&self) -> KvResult<()>;
}
