//! File-backed storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A byte log stored in one file.
///
/// `flush` hands buffered bytes to the OS; `sync` calls `File::sync_all`.
///
/// ```no_run
/// use layerdb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("kv.log")).unwrap();
/// backend.append(b"batch").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Opens or creates the file, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if offset > self.size || end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.get_mut().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.get_mut().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: self.size,
            });
        }
        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("kv.log")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
        assert!(matches!(
            backend.read_at(10, 5),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 10);
        assert_eq!(backend.read_all().unwrap(), b"persistent");
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"keep-drop").unwrap();

        backend.truncate(4).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"keep");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store").join("kv.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }
}
