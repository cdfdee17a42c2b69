//! Log-structured persistent engine.
//!
//! Every column family lives in a memtable. Every change (column creation,
//! column drop, write batch) is first appended to the log as one framed
//! record, then applied to the memtables. Opening an engine replays the log.
//!
//! A store directory looks like:
//!
//! ```text
//! <path>/
//! ├─ LOCK      # advisory lock, one process at a time
//! └─ kv.log    # the record log
//! ```

use crate::batch::{BatchOp, WriteBatch};
use crate::column::{ColumnDescriptor, ColumnHandle, ColumnId, EngineId};
use crate::engine::KvEngine;
use crate::error::{KvError, KvResult};
use crate::memtable::{EngineState, Memtable};
use crate::record::{LogReader, LogRecord};
use fs2::FileExt;
use layerdb_storage::{FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock file inside a store directory.
pub const LOCK_FILE: &str = "LOCK";

/// Name of the log file inside a store directory.
pub const LOG_FILE: &str = "kv.log";

const COMPACT_FILE: &str = "kv.log.compact";

/// Options for opening a [`LogEngine`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Whether to sync the log after every record (safer but slower).
    pub sync_on_write: bool,

    /// Whether `open_dir` creates a missing store directory.
    pub create_if_missing: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            create_if_missing: true,
        }
    }
}

impl LogOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every record.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create a missing store directory.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}

/// Size and content figures for an open engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Bytes in the log, live or not.
    pub log_bytes: u64,
    /// Key and value bytes currently live.
    pub live_bytes: u64,
    /// `(name, key count)` for each column family, in id order.
    pub columns: Vec<(String, usize)>,
}

impl LogStats {
    /// Total keys across all column families.
    #[must_use]
    pub fn keys(&self) -> usize {
        self.columns.iter().map(|(_, keys)| keys).sum()
    }
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Column families carried over.
    pub columns: usize,
    /// Keys carried over.
    pub keys: usize,
}

/// A persistent engine over a [`StorageBackend`].
///
/// Lock order is memtable before backend, for every writer.
pub struct LogEngine {
    state: EngineState,
    backend: Mutex<Box<dyn StorageBackend>>,
    options: LogOptions,
    dir: Option<PathBuf>,
    _lock: Option<File>,
}

impl LogEngine {
    /// Opens an engine over `backend`, replaying whatever it holds.
    ///
    /// Column families listed in `descriptors` that the log does not know
    /// yet are created. Column families already in the log keep their
    /// recorded options.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted or the backend fails. A log
    /// that merely ends in a partial record is cut back and opens normally.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        descriptors: &[ColumnDescriptor],
        options: LogOptions,
    ) -> KvResult<Self> {
        let mut memtable = Memtable::default();
        let (records, valid_len, torn, total) = {
            let data = backend.read_all()?;
            let mut reader = LogReader::new(&data);
            let mut records = 0usize;
            for item in reader.by_ref() {
                let (offset, record) = item?;
                replay(&mut memtable, record, offset)?;
                records += 1;
            }
            (records, reader.valid_len(), reader.torn_tail(), data.len() as u64)
        };

        if torn {
            warn!(
                valid = valid_len,
                dropped = total - valid_len,
                "truncating partial record at log tail"
            );
            backend.truncate(valid_len)?;
        }

        let mut created = 0usize;
        for desc in descriptors {
            if memtable.id_of(&desc.name).is_some() {
                continue;
            }
            let id = memtable.next_column_id();
            let record = LogRecord::CreateColumn {
                id,
                name: desc.name.clone(),
                options: desc.options.clone(),
            };
            backend.append(&record.encode()?)?;
            memtable.insert_column(id, &desc.name, desc.options.clone());
            created += 1;
        }
        if created > 0 {
            backend.sync()?;
        }

        let state = EngineState::new(memtable);
        debug!(
            engine = %state.id,
            records,
            created,
            "opened log engine"
        );

        Ok(Self {
            state,
            backend: Mutex::new(backend),
            options,
            dir: None,
            _lock: None,
        })
    }

    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::NotFound`] if the directory is missing and
    /// `create_if_missing` is off, [`KvError::Locked`] if another process
    /// holds it, or any replay error from [`LogEngine::open`].
    pub fn open_dir(
        path: &Path,
        descriptors: &[ColumnDescriptor],
        options: LogOptions,
    ) -> KvResult<Self> {
        if !path.exists() {
            if options.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(KvError::NotFound {
                    path: path.display().to_string(),
                });
            }
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(KvError::Locked);
        }

        let backend = FileBackend::open(&path.join(LOG_FILE))?;
        let mut engine = Self::open(Box::new(backend), descriptors, options)?;
        engine.dir = Some(path.to_path_buf());
        engine._lock = Some(lock);
        Ok(engine)
    }

    /// Rewrites the live state of the store at `path` into a fresh log and
    /// swaps it in.
    ///
    /// The directory stays locked for the whole operation. The new log is
    /// synced before it replaces the old one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or any write or rename
    /// fails. On error the original log is left in place.
    pub fn compact_dir(path: &Path) -> KvResult<CompactStats> {
        let engine = Self::open_dir(path, &[], LogOptions::new().create_if_missing(false))?;
        let target_path = path.join(COMPACT_FILE);
        if target_path.exists() {
            fs::remove_file(&target_path)?;
        }
        let target = FileBackend::open(&target_path)?;
        let stats = engine.compact_into(Box::new(target))?;
        fs::rename(&target_path, path.join(LOG_FILE))?;
        debug!(
            path = %path.display(),
            before = stats.bytes_before,
            after = stats.bytes_after,
            "compacted store"
        );
        Ok(stats)
    }

    /// Writes the live state into an empty backend: one `CreateColumn` record
    /// per column family (same ids) followed by one batch per non-empty
    /// column family.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is not empty or a write fails.
    pub fn compact_into(&self, mut target: Box<dyn StorageBackend>) -> KvResult<CompactStats> {
        if target.size()? != 0 {
            return Err(KvError::corrupted(0, "compaction target is not empty"));
        }

        let memtable = self.state.memtable.read();
        let mut stats = CompactStats::default();

        for (id, column) in memtable.columns() {
            let record = LogRecord::CreateColumn {
                id,
                name: column.name.to_string(),
                options: column.options.clone(),
            };
            target.append(&record.encode()?)?;
            stats.columns += 1;
        }
        for (id, column) in memtable.columns() {
            if column.data.is_empty() {
                continue;
            }
            let ops = column
                .data
                .iter()
                .map(|(key, value)| BatchOp::Put {
                    column: id,
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect::<Vec<_>>();
            stats.keys += ops.len();
            target.append(&LogRecord::Batch { ops }.encode()?)?;
        }
        target.sync()?;

        stats.bytes_before = self.backend.lock().size()?;
        stats.bytes_after = target.size()?;
        Ok(stats)
    }

    /// Returns size and content figures.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> KvResult<LogStats> {
        let memtable = self.state.memtable.read();
        let mut stats = LogStats {
            log_bytes: self.backend.lock().size()?,
            ..LogStats::default()
        };
        for (_, column) in memtable.columns() {
            stats.live_bytes += column
                .data
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>();
            stats.columns.push((column.name.to_string(), column.data.len()));
        }
        Ok(stats)
    }

    /// Returns the store directory, if opened with [`LogEngine::open_dir`].
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Appends one framed record. On failure the log is cut back to where
    /// it was, so a later append never lands behind garbage.
    fn append(&self, backend: &mut dyn StorageBackend, bytes: &[u8]) -> KvResult<()> {
        let start = backend.size()?;
        let result = backend.append(bytes).and_then(|_| {
            if self.options.sync_on_write {
                backend.sync()
            } else {
                backend.flush()
            }
        });
        if let Err(err) = result {
            warn!(offset = start, error = %err, "log append failed");
            if let Err(cut) = backend.truncate(start) {
                warn!(offset = start, error = %cut, "could not cut log back after failed append");
            }
            return Err(err.into());
        }
        Ok(())
    }
}

fn replay(memtable: &mut Memtable, record: LogRecord, offset: u64) -> KvResult<()> {
    match record {
        LogRecord::CreateColumn { id, name, options } => {
            if memtable.id_of(&name).is_some() {
                return Err(KvError::corrupted(
                    offset,
                    format!("column family {name} created twice"),
                ));
            }
            memtable.insert_column(id, &name, options);
        }
        LogRecord::DropColumn { id } => {
            if !memtable.remove_column(id) {
                return Err(KvError::corrupted(
                    offset,
                    format!("drop of unknown column family {}", id.as_u32()),
                ));
            }
        }
        LogRecord::Batch { ops } => {
            memtable
                .validate(&ops)
                .map_err(|err| KvError::corrupted(offset, err.to_string()))?;
            memtable.apply(ops);
        }
    }
    Ok(())
}

impl fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEngine")
            .field("engine", &self.state.id)
            .field("dir", &self.dir)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl KvEngine for LogEngine {
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
        if batch.is_empty() {
            return Ok(());
        }

        let mut memtable = self.state.memtable.write();
        memtable.validate(batch.ops())?;

        let record = LogRecord::Batch {
            ops: batch.into_ops(),
        };
        let bytes = record.encode()?;
        {
            let mut backend = self.backend.lock();
            self.append(&mut **backend, &bytes)?;
        }
        if let LogRecord::Batch { ops } = record {
            memtable.apply(ops);
        }
        Ok(())
    }

    fn drop_column_family(&self, cf: ColumnHandle) -> KvResult<()> {
        self.state.check_handle(&cf)?;
        let mut memtable = self.state.memtable.write();
        let id: ColumnId = cf.id();
        memtable.column(id)?;

        let bytes = LogRecord::DropColumn { id }.encode()?;
        {
            let mut backend = self.backend.lock();
            self.append(&mut **backend, &bytes)?;
        }
        memtable.remove_column(id);
        debug!(engine = %self.state.id, column = cf.name(), "dropped column family");
        Ok(())
    }

    fn live_handles(&self) -> usize {
        self.state.live_handles()
    }

    fn sync(&self) -> KvResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VerifyReport;
    use layerdb_storage::InMemoryBackend;
    use tempfile::tempdir;

    fn descriptors() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::default_column(),
            ColumnDescriptor::new("accounts.by_name"),
        ]
    }

    fn put(engine: &LogEngine, column: &str, key: &[u8], value: &[u8]) {
        let cf = engine.column_family(column).unwrap();
        let mut batch = WriteBatch::new();
        batch.put(&cf, key.to_vec(), value.to_vec());
        engine.write(batch).unwrap();
    }

    #[test]
    fn reopen_replays_batches() {
        let backend = InMemoryBackend::new();
        {
            let engine =
                LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new())
                    .unwrap();
            put(&engine, "default", b"1", b"alice");
            put(&engine, "accounts.by_name", b"alice", b"1");

            let cf = engine.column_family("default").unwrap();
            let mut batch = WriteBatch::new();
            batch.put(&cf, b"2".to_vec(), b"bob".to_vec());
            batch.delete(&cf, b"1".to_vec());
            engine.write(batch).unwrap();
        }

        let engine =
            LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new()).unwrap();
        let cf = engine.column_family("default").unwrap();
        assert_eq!(engine.get(&cf, b"1").unwrap(), None);
        assert_eq!(engine.get(&cf, b"2").unwrap(), Some(b"bob".to_vec()));
        let by_name = engine.column_family("accounts.by_name").unwrap();
        assert_eq!(engine.len(&by_name).unwrap(), 1);
    }

    #[test]
    fn reopen_does_not_recreate_columns() {
        let backend = InMemoryBackend::new();
        drop(LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new()).unwrap());
        let size = backend.data().len();
        drop(LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new()).unwrap());
        assert_eq!(backend.data().len(), size);
    }

    #[test]
    fn torn_tail_is_cut_back() {
        let backend = InMemoryBackend::new();
        {
            let engine =
                LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new())
                    .unwrap();
            put(&engine, "default", b"1", b"alice");
            put(&engine, "default", b"2", b"bob");
        }
        let mut data = backend.data();
        data.truncate(data.len() - 5);
        let torn = InMemoryBackend::with_data(data);

        let engine =
            LogEngine::open(Box::new(torn.share()), &descriptors(), LogOptions::new()).unwrap();
        let cf = engine.column_family("default").unwrap();
        assert_eq!(engine.get(&cf, b"1").unwrap(), Some(b"alice".to_vec()));
        assert_eq!(engine.get(&cf, b"2").unwrap(), None);
        assert!(VerifyReport::scan(&torn.data()).is_ok());
    }

    #[test]
    fn corrupted_record_fails_open() {
        let backend = InMemoryBackend::new();
        {
            let engine =
                LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new())
                    .unwrap();
            put(&engine, "default", b"1", b"alice");
        }
        let last = backend.data().len() - 6;
        backend.overwrite_byte(last, 0xAA);

        let result = LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new());
        assert!(matches!(result, Err(KvError::ChecksumMismatch { .. })));
    }

    #[test]
    fn dropped_column_stays_dropped() {
        let backend = InMemoryBackend::new();
        {
            let engine =
                LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new())
                    .unwrap();
            put(&engine, "accounts.by_name", b"alice", b"1");
            let cf = engine.column_family("accounts.by_name").unwrap();
            engine.drop_column_family(cf).unwrap();
        }

        let engine = LogEngine::open(
            Box::new(backend.share()),
            &[ColumnDescriptor::default_column()],
            LogOptions::new(),
        )
        .unwrap();
        assert_eq!(engine.column_family_names(), vec!["default".to_string()]);
    }

    #[test]
    fn compaction_keeps_live_state_only() {
        let backend = InMemoryBackend::new();
        let engine =
            LogEngine::open(Box::new(backend.share()), &descriptors(), LogOptions::new()).unwrap();
        for i in 0..20u8 {
            put(&engine, "default", b"k", &[i]);
        }

        let target = InMemoryBackend::new();
        let stats = engine.compact_into(Box::new(target.share())).unwrap();
        assert_eq!(stats.columns, 2);
        assert_eq!(stats.keys, 1);
        assert!(stats.bytes_after < stats.bytes_before);

        let reopened =
            LogEngine::open(Box::new(target.share()), &descriptors(), LogOptions::new()).unwrap();
        let cf = reopened.column_family("default").unwrap();
        assert_eq!(reopened.get(&cf, b"k").unwrap(), Some(vec![19]));
    }

    #[test]
    fn directory_is_locked_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");
        let engine = LogEngine::open_dir(&path, &descriptors(), LogOptions::new()).unwrap();
        assert!(path.join(LOG_FILE).exists());
        assert!(matches!(
            LogEngine::open_dir(&path, &descriptors(), LogOptions::new()),
            Err(KvError::Locked)
        ));
        drop(engine);
        assert!(LogEngine::open_dir(&path, &descriptors(), LogOptions::new()).is_ok());
    }

    #[test]
    fn missing_directory_without_create() {
        let dir = tempdir().unwrap();
        let result = LogEngine::open_dir(
            &dir.path().join("absent"),
            &descriptors(),
            LogOptions::new().create_if_missing(false),
        );
        assert!(matches!(result, Err(KvError::NotFound { .. })));
    }

    #[test]
    fn compact_dir_swaps_log() {
        let dir = tempdir().unwrap();
        {
            let engine =
                LogEngine::open_dir(dir.path(), &descriptors(), LogOptions::new()).unwrap();
            for i in 0..10u8 {
                put(&engine, "default", b"k", &[i]);
            }
        }
        let stats = LogEngine::compact_dir(dir.path()).unwrap();
        assert_eq!(stats.keys, 1);

        let engine = LogEngine::open_dir(dir.path(), &descriptors(), LogOptions::new()).unwrap();
        let cf = engine.column_family("default").unwrap();
        assert_eq!(engine.get(&cf, b"k").unwrap(), Some(vec![9]));
        assert_eq!(engine.stats().unwrap().log_bytes, stats.bytes_after);
    }
}
