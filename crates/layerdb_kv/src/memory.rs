//! Volatile engine.

use crate::batch::{BatchOp, WriteBatch};
use crate::column::{ColumnDescriptor, ColumnHandle, EngineId};
use crate::engine::KvEngine;
use crate::error::{KvError, KvResult};
use crate::memtable::{EngineState, Memtable};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// An engine that keeps every column family in memory.
///
/// Besides ephemeral containers it serves tests: [`MemoryEngine::fail_next_writes`]
/// makes upcoming batch writes fail, and [`MemoryEngine::without_truncate`]
/// opens an engine that reports no bulk-truncate support.
#[derive(Debug)]
pub struct MemoryEngine {
    state: EngineState,
    truncate: bool,
    failures: AtomicUsize,
}

impl MemoryEngine {
    /// Opens an engine with the given column families.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the persistent engines.
    pub fn open(descriptors: &[ColumnDescriptor]) -> KvResult<Self> {
        Ok(Self::build(descriptors, true))
    }

    /// Opens an engine whose `supports_truncate` is false.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the persistent engines.
    pub fn without_truncate(descriptors: &[ColumnDescriptor]) -> KvResult<Self> {
        Ok(Self::build(descriptors, false))
    }

    fn build(descriptors: &[ColumnDescriptor], truncate: bool) -> Self {
        let mut memtable = Memtable::default();
        for desc in descriptors {
            if memtable.id_of(&desc.name).is_none() {
                let id = memtable.next_column_id();
                memtable.insert_column(id, &desc.name, desc.options.clone());
            }
        }
        let state = EngineState::new(memtable);
        debug!(engine = %state.id, columns = descriptors.len(), "opened memory engine");
        Self {
            state,
            truncate,
            failures: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` calls to `write` fail with
    /// [`KvError::Injected`] without applying anything.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::Release);
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl KvEngine for MemoryEngine {
    fn id(&self) -> EngineId {
        self.state.id
    }

    fn column_family(&self, name: &str) -> KvResult<ColumnHandle> {
        self.state.handle(name)
    }

    fn column_family_names(&self) -> Vec<String> {
        self.state.memtable.read().names()
    }

    fn get(&self, cf: &ColumnHandle, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.state.get(cf, key)
    }

    fn scan(&self, cf: &ColumnHandle) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.state.scan(cf)
    }

    fn len(&self, cf: &ColumnHandle) -> KvResult<usize> {
        self.state.len(cf)
    }

    fn write(&self, batch: WriteBatch) -> KvResult<()> {
        self.state.check_batch(&batch)?;
        if self.take_failure() {
            return Err(KvError::Injected("batch write".into()));
        }
        if !self.truncate
            && batch
                .ops()
                .iter()
                .any(|op| matches!(op, BatchOp::Truncate { .. }))
        {
            return Err(KvError::Injected("truncate is disabled".into()));
        }

        let mut memtable = self.state.memtable.write();
        memtable.validate(batch.ops())?;
        memtable.apply(batch.into_ops());
        Ok(())
    }

    fn drop_column_family(&self, cf: ColumnHandle) -> KvResult<()> {
        self.state.check_handle(&cf)?;
        self.state.memtable.write().remove_column(cf.id());
        debug!(engine = %self.state.id, column = cf.name(), "dropped column family");
        Ok(())
    }

    fn supports_truncate(&self) -> bool {
        self.truncate
    }

    fn live_handles(&self) -> usize {
        self.state.live_handles()
    }

    fn sync(&self) -> KvResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MemoryEngine {
        MemoryEngine::open(&[
            ColumnDescriptor::default_column(),
            ColumnDescriptor::new("by_name"),
        ])
        .unwrap()
    }

    #[test]
    fn put_get_delete() {
        let engine = engine();
        let cf = engine.column_family("by_name").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(&cf, b"alice".to_vec(), b"1".to_vec());
        batch.put(&cf, b"bob".to_vec(), b"2".to_vec());
        engine.write(batch).unwrap();

        assert_eq!(engine.get(&cf, b"alice").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.len(&cf).unwrap(), 2);

        let mut batch = WriteBatch::new();
        batch.delete(&cf, b"alice".to_vec());
        engine.write(batch).unwrap();

        assert_eq!(engine.get(&cf, b"alice").unwrap(), None);
        let keys: Vec<Vec<u8>> = engine.scan(&cf).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"bob".to_vec()]);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.column_family("missing"),
            Err(KvError::UnknownColumnFamily { .. })
        ));
    }

    #[test]
    fn injected_failure_applies_nothing() {
        let engine = engine();
        let cf = engine.column_family("default").unwrap();
        engine.fail_next_writes(1);

        let mut batch = WriteBatch::new();
        batch.put(&cf, b"k".to_vec(), b"v".to_vec());
        assert!(matches!(engine.write(batch.clone()), Err(KvError::Injected(_))));
        assert_eq!(engine.len(&cf).unwrap(), 0);

        engine.write(batch).unwrap();
        assert_eq!(engine.len(&cf).unwrap(), 1);
    }

    #[test]
    fn oversized_value_rejects_whole_batch() {
        let engine = MemoryEngine::open(&[
            ColumnDescriptor::default_column(),
            ColumnDescriptor::new("tiny")
                .with_options(crate::ColumnOptions::new().max_value_size(2)),
        ])
        .unwrap();
        let default = engine.column_family("default").unwrap();
        let tiny = engine.column_family("tiny").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(&default, b"a".to_vec(), b"ok".to_vec());
        batch.put(&tiny, b"b".to_vec(), b"too big".to_vec());
        assert!(matches!(engine.write(batch), Err(KvError::ValueTooLarge { .. })));
        assert_eq!(engine.len(&default).unwrap(), 0);
    }

    #[test]
    fn foreign_handles_are_refused() {
        let a = engine();
        let b = engine();
        let cf = b.column_family("default").unwrap();

        assert!(matches!(a.get(&cf, b"k"), Err(KvError::ForeignHandle { .. })));

        let mut batch = WriteBatch::new();
        batch.put(&cf, b"k".to_vec(), b"v".to_vec());
        assert!(matches!(a.write(batch), Err(KvError::ForeignHandle { .. })));
    }

    #[test]
    fn handles_are_released_once() {
        let engine = engine();
        let a = engine.column_family("default").unwrap();
        let b = engine.column_family("by_name").unwrap();
        assert_eq!(engine.live_handles(), 2);

        engine.drop_column_family(b).unwrap();
        assert_eq!(engine.live_handles(), 1);
        assert_eq!(engine.column_family_names(), vec!["default".to_string()]);

        drop(a);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn truncate_can_be_disabled() {
        let engine = MemoryEngine::without_truncate(&[ColumnDescriptor::default_column()]).unwrap();
        assert!(!engine.supports_truncate());

        let cf = engine.column_family("default").unwrap();
        let mut batch = WriteBatch::new();
        batch.truncate(&cf);
        assert!(engine.write(batch).is_err());
    }
}
