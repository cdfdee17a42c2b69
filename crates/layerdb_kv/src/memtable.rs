//! Column family memtables shared by every engine.

use crate::batch::{BatchOp, WriteBatch};
use crate::column::{ColumnDescriptor, ColumnHandle, ColumnId, ColumnOptions, EngineId};
use crate::error::{KvError, KvResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One column family's live keys.
#[derive(Debug)]
pub(crate) struct Column {
    pub(crate) name: Arc<str>,
    pub(crate) options: ColumnOptions,
    pub(crate) data: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Every live column family of an engine.
#[derive(Debug, Default)]
pub(crate) struct Memtable {
    columns: BTreeMap<ColumnId, Column>,
    names: HashMap<String, ColumnId>,
    next_id: u32,
}

impl Memtable {
    pub(crate) fn id_of(&self, name: &str) -> Option<ColumnId> {
        self.names.get(name).copied()
    }

    pub(crate) fn next_column_id(&self) -> ColumnId {
        ColumnId(self.next_id)
    }

    /// Registers a column family under a known id. Used both for new columns
    /// and when replaying a log.
    pub(crate) fn insert_column(&mut self, id: ColumnId, name: &str, options: ColumnOptions) {
        self.names.insert(name.to_string(), id);
        self.columns.insert(
            id,
            Column {
                name: Arc::from(name),
                options,
                data: BTreeMap::new(),
            },
        );
        self.next_id = self.next_id.max(id.0 + 1);
    }

    pub(crate) fn remove_column(&mut self, id: ColumnId) -> bool {
        match self.columns.remove(&id) {
            Some(column) => {
                self.names.remove(&*column.name);
                true
            }
            None => false,
        }
    }

    pub(crate) fn column(&self, id: ColumnId) -> KvResult<&Column> {
        self.columns
            .get(&id)
            .ok_or(KvError::ColumnFamilyDropped { id: id.0 })
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = (ColumnId, &Column)> {
        self.columns.iter().map(|(id, column)| (*id, column))
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Checks every operation before anything is applied.
    pub(crate) fn validate(&self, ops: &[BatchOp]) -> KvResult<()> {
        for op in ops {
            let column = self.column(op.column())?;
            if let (BatchOp::Put { value, .. }, Some(limit)) = (op, column.options.max_value_size)
            {
                if value.len() > limit {
                    return Err(KvError::ValueTooLarge {
                        column: column.name.to_string(),
                        size: value.len(),
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies validated operations in order.
    pub(crate) fn apply(&mut self, ops: Vec<BatchOp>) {
        for op in ops {
            match op {
                BatchOp::Put { column, key, value } => {
                    if let Some(column) = self.columns.get_mut(&column) {
                        column.data.insert(key, value);
                    }
                }
                BatchOp::Delete { column, key } => {
                    if let Some(column) = self.columns.get_mut(&column) {
                        column.data.remove(&key);
                    }
                }
                BatchOp::Truncate { column } => {
                    if let Some(column) = self.columns.get_mut(&column) {
                        column.data.clear();
                    }
                }
            }
        }
    }
}

/// State common to every engine: identity, handle accounting, memtables.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) id: EngineId,
    live: Arc<AtomicUsize>,
    pub(crate) memtable: RwLock<Memtable>,
}

impl EngineState {
    pub(crate) fn new(memtable: Memtable) -> Self {
        Self {
            id: EngineId::next(),
            live: Arc::new(AtomicUsize::new(0)),
            memtable: RwLock::new(memtable),
        }
    }

    /// Descriptors whose column family does not exist yet.
    pub(crate) fn missing<'a>(
        &self,
        descriptors: &'a [ColumnDescriptor],
    ) -> Vec<&'a ColumnDescriptor> {
        let memtable = self.memtable.read();
        descriptors
            .iter()
            .filter(|desc| memtable.id_of(&desc.name).is_none())
            .collect()
    }

    pub(crate) fn handle(&self, name: &str) -> KvResult<ColumnHandle> {
        let memtable = self.memtable.read();
        let id = memtable
            .id_of(name)
            .ok_or_else(|| KvError::unknown_column(name))?;
        let column = memtable.column(id)?;
        Ok(ColumnHandle::acquire(
            self.id,
            id,
            Arc::clone(&column.name),
            &self.live,
        ))
    }

    pub(crate) fn check_handle(&self, cf: &ColumnHandle) -> KvResult<()> {
        if cf.engine() != self.id {
            return Err(KvError::ForeignHandle {
                handle_engine: cf.engine().as_u64(),
                engine: self.id.as_u64(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_batch(&self, batch: &WriteBatch) -> KvResult<()> {
        let foreign = batch
            .foreign()
            .or(batch.engine().filter(|engine| *engine != self.id));
        match foreign {
            Some(engine) => Err(KvError::ForeignHandle {
                handle_engine: engine.as_u64(),
                engine: self.id.as_u64(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn get(&self, cf: &ColumnHandle, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.check_handle(cf)?;
        let memtable = self.memtable.read();
        Ok(memtable.column(cf.id())?.data.get(key).cloned())
    }

    pub(crate) fn scan(&self, cf: &ColumnHandle) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_handle(cf)?;
        let memtable = self.memtable.read();
        Ok(memtable
            .column(cf.id())?
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub(crate) fn len(&self, cf: &ColumnHandle) -> KvResult<usize> {
        self.check_handle(cf)?;
        Ok(self.memtable.read().column(cf.id())?.data.len())
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}
