//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A byte log held in memory.
///
/// Clones made with [`InMemoryBackend::share`] point at the same buffer,
/// which lets a test drop an engine and reopen it over the bytes it left
/// behind, the way a process restart would.
///
/// # Example
///
/// ```rust
/// use layerdb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let shared = backend.share();
/// backend.append(b"abc").unwrap();
/// assert_eq!(shared.size().unwrap(), 3);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that starts with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a second handle onto the same buffer.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }

    /// Returns a copy of the buffer.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites one byte in place. Test hook for corruption scenarios.
    pub fn overwrite_byte(&self, offset: usize, byte: u8) {
        if let Some(slot) = self.data.write().get_mut(offset) {
            *slot = byte;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn shared_handles_see_the_same_bytes() {
        let mut backend = InMemoryBackend::new();
        let other = backend.share();
        backend.append(b"abc").unwrap();

        assert_eq!(other.read_at(0, 3).unwrap(), b"abc");
        other.overwrite_byte(1, b'X');
        assert_eq!(backend.data(), b"aXc");
    }

    #[test]
    fn truncate_drops_the_tail() {
        let mut backend = InMemoryBackend::with_data(b"hello world".to_vec());
        backend.truncate(5).unwrap();
        assert_eq!(backend.data(), b"hello");
        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }
}
