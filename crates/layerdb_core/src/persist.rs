//! Persistent adapter.
//!
//! Maps a container onto column families of a [`KvEngine`]. Column 0 is the
//! base column holding record payloads and metadata; column `i + 1` belongs
//! to layer `i`. Writes are staged in a [`WriteBatch`] and become durable
//! together on [`PersistentAdapter::flush`].

use crate::error::{CoreError, CoreResult, StoreError};
use crate::node::RecordId;
use layerdb_kv::{ColumnDescriptor, ColumnHandle, KvEngine, WriteBatch};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const PAYLOAD_PREFIX: u8 = b'r';

/// Base-column key holding the next record id.
pub const NEXT_ID_KEY: &[u8] = b"m:next_id";

/// Base-column key of a record payload.
#[must_use]
pub fn payload_key(record: RecordId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(PAYLOAD_PREFIX);
    key.extend_from_slice(&record.to_be_bytes());
    key
}

/// Parses a base-column key. Returns `None` for metadata keys.
#[must_use]
pub fn parse_payload_key(key: &[u8]) -> Option<RecordId> {
    match key.split_first() {
        Some((&PAYLOAD_PREFIX, rest)) => RecordId::from_be_slice(rest),
        _ => None,
    }
}

/// Owns one handle per column family of a container and its write buffer.
///
/// Handles are released exactly once, when the adapter is dropped or
/// destroyed.
pub struct PersistentAdapter {
    engine: Arc<dyn KvEngine>,
    columns: Vec<ColumnHandle>,
    batch: WriteBatch,
}

impl PersistentAdapter {
    /// Acquires a handle for every descriptor, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if a column family was not declared when
    /// the engine opened. Handles acquired so far are released.
    pub fn open(
        engine: Arc<dyn KvEngine>,
        descriptors: &[ColumnDescriptor],
    ) -> Result<Self, StoreError> {
        let columns = descriptors
            .iter()
            .map(|desc| engine.column_family(&desc.name))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Open)?;
        debug!(
            engine = %engine.id(),
            columns = columns.len(),
            "opened persistent adapter"
        );
        Ok(Self {
            engine,
            columns,
            batch: WriteBatch::new(),
        })
    }

    fn column(&self, column: usize) -> CoreResult<&ColumnHandle> {
        self.columns.get(column).ok_or_else(|| CoreError::LayerNotFound {
            name: format!("column {column}"),
        })
    }

    /// Stages a put.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range.
    pub fn put(&mut self, column: usize, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        let cf = self.columns.get(column).ok_or_else(|| CoreError::LayerNotFound {
            name: format!("column {column}"),
        })?;
        self.batch.put(cf, key, value);
        Ok(())
    }

    /// Stages a delete.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range.
    pub fn delete(&mut self, column: usize, key: Vec<u8>) -> CoreResult<()> {
        let cf = self.columns.get(column).ok_or_else(|| CoreError::LayerNotFound {
            name: format!("column {column}"),
        })?;
        self.batch.delete(cf, key);
        Ok(())
    }

    /// Stages removal of every key in a column.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range.
    pub fn truncate(&mut self, column: usize) -> CoreResult<()> {
        let cf = self.columns.get(column).ok_or_else(|| CoreError::LayerNotFound {
            name: format!("column {column}"),
        })?;
        self.batch.truncate(cf);
        Ok(())
    }

    /// Applies the write buffer as one atomic batch.
    ///
    /// The buffer is emptied whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the engine refuses the batch; the
    /// persisted state is then unchanged.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let ops = batch.len();
        let bytes = batch.byte_size();
        self.engine.write(batch).map_err(|err| {
            warn!(ops, error = %err, "flush failed, write buffer discarded");
            StoreError::Io(err)
        })?;
        debug!(ops, bytes, "flushed write buffer");
        Ok(())
    }

    /// Drops every staged operation.
    pub fn discard(&mut self) {
        self.batch.clear();
    }

    /// Number of staged operations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Point lookup in the durable store.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range or the read fails.
    pub fn get(&self, column: usize, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let cf = self.column(column)?;
        Ok(self.engine.get(cf, key).map_err(StoreError::Io)?)
    }

    /// Every durable entry of a column, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range or the read fails.
    pub fn scan(&self, column: usize) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.column(column)?;
        Ok(self.engine.scan(cf).map_err(StoreError::Io)?)
    }

    /// Number of durable keys in a column.
    ///
    /// # Errors
    ///
    /// Returns an error if `column` is out of range or the read fails.
    pub fn column_len(&self, column: usize) -> CoreResult<usize> {
        let cf = self.column(column)?;
        Ok(self.engine.len(cf).map_err(StoreError::Io)?)
    }

    /// Number of columns held.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Whether staged truncates are honoured by the engine.
    #[must_use]
    pub fn supports_truncate(&self) -> bool {
        self.engine.supports_truncate()
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    /// Drops every column family of the container from the engine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a drop fails. Columns not yet dropped
    /// are released anyway.
    pub fn destroy(mut self) -> Result<(), StoreError> {
        self.batch.clear();
        for cf in std::mem::take(&mut self.columns) {
            let name = cf.name().to_string();
            self.engine.drop_column_family(cf).map_err(StoreError::Io)?;
            debug!(column = %name, "dropped column family");
        }
        Ok(())
    }
}

impl Drop for PersistentAdapter {
    fn drop(&mut self) {
        if !self.batch.is_empty() {
            warn!(
                ops = self.batch.len(),
                "persistent adapter dropped with unflushed writes"
            );
        }
    }
}

impl fmt::Debug for PersistentAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentAdapter")
            .field("engine", &self.engine.id())
            .field("columns", &self.columns)
            .field("pending", &self.batch.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerdb_kv::{KvError, MemoryEngine};

    fn descriptors() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("accounts"),
            ColumnDescriptor::new("accounts.by_name"),
        ]
    }

    fn engine() -> Arc<MemoryEngine> {
        Arc::new(MemoryEngine::open(&descriptors()).unwrap())
    }

    #[test]
    fn writes_are_invisible_until_flush() {
        let engine = engine();
        let mut adapter = PersistentAdapter::open(engine.clone(), &descriptors()).unwrap();

        adapter.put(1, b"alice".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(adapter.pending(), 1);
        assert_eq!(adapter.get(1, b"alice").unwrap(), None);

        adapter.flush().unwrap();
        assert_eq!(adapter.pending(), 0);
        assert_eq!(adapter.get(1, b"alice").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn failed_flush_changes_nothing() {
        let engine = engine();
        let mut adapter = PersistentAdapter::open(engine.clone(), &descriptors()).unwrap();
        adapter.put(0, payload_key(RecordId(1)), b"x".to_vec()).unwrap();

        engine.fail_next_writes(1);
        assert!(matches!(
            adapter.flush(),
            Err(StoreError::Io(KvError::Injected(_)))
        ));
        assert_eq!(adapter.pending(), 0);
        assert_eq!(adapter.column_len(0).unwrap(), 0);
    }

    #[test]
    fn missing_column_fails_open() {
        let engine = engine();
        let mut wanted = descriptors();
        wanted.push(ColumnDescriptor::new("accounts.by_balance"));

        let result = PersistentAdapter::open(engine.clone(), &wanted);
        assert!(matches!(result, Err(StoreError::Open(_))));
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn handles_released_on_drop() {
        let engine = engine();
        let adapter = PersistentAdapter::open(engine.clone(), &descriptors()).unwrap();
        assert_eq!(engine.live_handles(), 2);
        drop(adapter);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn destroy_drops_columns() {
        let engine = engine();
        let adapter = PersistentAdapter::open(engine.clone(), &descriptors()).unwrap();
        adapter.destroy().unwrap();
        assert!(engine.column_family_names().is_empty());
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn payload_keys() {
        let key = payload_key(RecordId(5));
        assert_eq!(parse_payload_key(&key), Some(RecordId(5)));
        assert_eq!(parse_payload_key(NEXT_ID_KEY), None);
    }
}
