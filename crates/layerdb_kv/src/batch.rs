//! Atomic write batches.

use crate::column::{ColumnHandle, ColumnId, EngineId};

/// One staged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key` in a column family.
    Put {
        /// Target column family.
        column: ColumnId,
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove `key` from a column family. Removing a missing key is a no-op.
    Delete {
        /// Target column family.
        column: ColumnId,
        /// Key bytes.
        key: Vec<u8>,
    },
    /// Remove every key of a column family.
    Truncate {
        /// Target column family.
        column: ColumnId,
    },
}

impl BatchOp {
    /// Returns the column family the operation targets.
    #[must_use]
    pub fn column(&self) -> ColumnId {
        match self {
            Self::Put { column, .. } | Self::Delete { column, .. } | Self::Truncate { column } => {
                *column
            }
        }
    }
}

/// A staged set of operations applied atomically by
/// [`crate::KvEngine::write`].
///
/// Operations apply in the order they were staged, so a `Truncate` followed
/// by a `Put` on the same column family leaves exactly that one key.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    engine: Option<EngineId>,
    foreign: Option<EngineId>,
    ops: Vec<BatchOp>,
    byte_size: usize,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put.
    pub fn put(&mut self, cf: &ColumnHandle, key: Vec<u8>, value: Vec<u8>) {
        self.track(cf);
        self.byte_size += key.len() + value.len();
        self.ops.push(BatchOp::Put {
            column: cf.id(),
            key,
            value,
        });
    }

    /// Stages a delete.
    pub fn delete(&mut self, cf: &ColumnHandle, key: Vec<u8>) {
        self.track(cf);
        self.byte_size += key.len();
        self.ops.push(BatchOp::Delete {
            column: cf.id(),
            key,
        });
    }

    /// Stages removal of every key in a column family.
    pub fn truncate(&mut self, cf: &ColumnHandle) {
        self.track(cf);
        self.ops.push(BatchOp::Truncate { column: cf.id() });
    }

    /// Returns the number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the total key and value bytes staged.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Returns the staged operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Drops every staged operation.
    pub fn clear(&mut self) {
        self.engine = None;
        self.foreign = None;
        self.ops.clear();
        self.byte_size = 0;
    }

    /// Returns the engine whose handles staged this batch.
    pub(crate) fn engine(&self) -> Option<EngineId> {
        self.engine
    }

    /// Returns a handle engine that disagreed with the first one, if any.
    pub(crate) fn foreign(&self) -> Option<EngineId> {
        self.foreign
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    fn track(&mut self, cf: &ColumnHandle) {
        match self.engine {
            None => self.engine = Some(cf.engine()),
            Some(engine) if engine != cf.engine() && self.foreign.is_none() => {
                self.foreign = Some(cf.engine());
            }
            Some(_) => {}
        }
    }
}
