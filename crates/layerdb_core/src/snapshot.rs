//! Structural snapshots of index layers.
//!
//! A snapshot holds the ordering and position metadata of every layer, never
//! the record payloads. Payloads are always read from the base column family;
//! the snapshot only spares rebuilding layer structure from the per-layer
//! columns. A container opened from a snapshot still checks every layer
//! against its column, so a snapshot older than the store is rejected.
//!
//! ## Format
//!
//! ```text
//! | magic "LDXS" (4) | version u8 | layer count u16 |
//! per layer: | kind u8 | name (u16 len + UTF-8) | unique u8 | entry count u64 | entries |
//! | crc32 u32 |
//! ```
//!
//! Integers are little-endian. Keyed layers store `(join seq u64, record id
//! u64)` per entry in layer order. Positional layers store
//! `(rank u64, record id u64)`.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexKind, IndexLayer};
use crate::node::{NodeId, NodeStore, RecordId};
use crate::record::Record;

/// Magic bytes opening a snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"LDXS";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 2;

/// Appends snapshot fields.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a `u16`.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a `u64`.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a record id.
    pub fn put_record(&mut self, id: RecordId) {
        self.put_u64(id.as_u64());
    }

    /// Writes a length-prefixed string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is longer than `u16::MAX` bytes.
    pub fn put_str(&mut self, value: &str) -> CoreResult<()> {
        let len = u16::try_from(value.len())
            .map_err(|_| CoreError::invalid_format("string too long for snapshot"))?;
        self.put_u16(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn finish(mut self) -> Vec<u8> {
        let crc = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf
    }
}

/// Reads snapshot fields.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    /// Creates a reader over raw fields, without header or checksum.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CoreError::invalid_format("snapshot truncated"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns an error at end of data.
    pub fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of data.
    pub fn u16(&mut self) -> CoreResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a `u64`.
    ///
    /// # Errors
    ///
    /// Returns an error at end of data.
    pub fn u64(&mut self) -> CoreResult<u64> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(arr))
    }

    /// Reads a record id.
    ///
    /// # Errors
    ///
    /// Returns an error at end of data.
    pub fn record(&mut self) -> CoreResult<RecordId> {
        self.u64().map(RecordId)
    }

    /// Reads a length-prefixed string.
    ///
    /// # Errors
    ///
    /// Returns an error at end of data or on invalid UTF-8.
    pub fn str(&mut self) -> CoreResult<String> {
        let len = self.u16()? as usize;
        String::from_utf8(self.take(len)?.to_vec())
            .map_err(|_| CoreError::invalid_format("snapshot string is not UTF-8"))
    }

    /// Reads an entry count and checks that at least `entry_size` bytes per
    /// entry remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the count cannot be satisfied by the data left.
    pub fn count(&mut self, entry_size: usize) -> CoreResult<usize> {
        let count = self.u64()?;
        let remaining = (self.data.len() - self.pos) as u64;
        if count.saturating_mul(entry_size as u64) > remaining {
            return Err(CoreError::invalid_format(format!(
                "snapshot claims {count} entries but only {remaining} bytes remain"
            )));
        }
        Ok(count as usize)
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Serializes every layer in order.
pub(crate) fn write_snapshot<V: Record>(
    layers: &[Box<dyn IndexLayer<V>>],
    nodes: &NodeStore<V>,
) -> CoreResult<Vec<u8>> {
    let count = u16::try_from(layers.len())
        .map_err(|_| CoreError::invalid_format("too many layers for a snapshot"))?;

    let mut w = SnapshotWriter::new();
    w.buf.extend_from_slice(&SNAPSHOT_MAGIC);
    w.put_u8(SNAPSHOT_VERSION);
    w.put_u16(count);
    for layer in layers {
        w.put_u8(layer.kind() as u8);
        w.put_str(layer.name())?;
        w.put_u8(u8::from(layer.unique()));
        layer.save(nodes, &mut w)?;
    }
    Ok(w.finish())
}

/// Checks framing, then loads every layer in specifier order.
///
/// Layer names, kinds and uniqueness must match the container exactly.
pub(crate) fn read_snapshot<V: Record>(
    data: &[u8],
    layers: &mut [Box<dyn IndexLayer<V>>],
    nodes: &NodeStore<V>,
    resolve: &dyn Fn(RecordId) -> Option<NodeId>,
) -> CoreResult<()> {
    if data.len() < SNAPSHOT_MAGIC.len() + 3 + 4 {
        return Err(CoreError::invalid_format("snapshot too short"));
    }
    let (body, crc) = data.split_at(data.len() - 4);
    let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(CoreError::invalid_format(format!(
            "snapshot checksum mismatch: expected {expected:08x}, got {actual:08x}"
        )));
    }
    if body[..4] != SNAPSHOT_MAGIC {
        return Err(CoreError::invalid_format("not a layer snapshot"));
    }

    let mut r = SnapshotReader::new(&body[4..]);
    let version = r.u8()?;
    if version != SNAPSHOT_VERSION {
        return Err(CoreError::invalid_format(format!(
            "unsupported snapshot version {version}"
        )));
    }
    let count = r.u16()? as usize;
    if count != layers.len() {
        return Err(CoreError::invalid_format(format!(
            "snapshot has {count} layers, container has {}",
            layers.len()
        )));
    }

    for layer in layers.iter_mut() {
        let kind = IndexKind::from_byte(r.u8()?)
            .ok_or_else(|| CoreError::invalid_format("unknown layer kind in snapshot"))?;
        let name = r.str()?;
        let unique = r.u8()? != 0;
        if kind != layer.kind() || name != layer.name() || unique != layer.unique() {
            return Err(CoreError::invalid_format(format!(
                "snapshot layer {name} ({kind}) does not match container layer {} ({})",
                layer.name(),
                layer.kind()
            )));
        }
        layer.clear();
        layer.load(&mut r, nodes, resolve)?;
    }

    if !r.is_at_end() {
        return Err(CoreError::invalid_format("trailing bytes after last layer"));
    }
    Ok(())
}
