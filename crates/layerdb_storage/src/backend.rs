//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// # Invariants
///
/// - `append` returns the offset at which the bytes start
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] when the range is not
    /// fully inside the log, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends bytes to the end of the log and returns their offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes down to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and file metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the log back to `new_size` bytes.
    ///
    /// Used to drop a torn tail found during replay.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] when `new_size`
    /// exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read or the read fails.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}
