//! Log record framing.
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The checksum covers every byte before it.
//!
//! A record cut short at the end of the log (a crash mid-append) ends replay
//! cleanly. A checksum mismatch, bad magic or unknown kind is fatal.

use crate::batch::BatchOp;
use crate::column::{ColumnId, ColumnOptions};
use crate::error::{KvError, KvResult};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"LDKV";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_TRUNCATE: u8 = 3;

/// Kind byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordKind {
    /// A column family was created.
    CreateColumn = 1,
    /// A column family was dropped.
    DropColumn = 2,
    /// An atomic write batch.
    Batch = 3,
}

impl LogRecordKind {
    /// Converts a kind byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateColumn),
            2 => Some(Self::DropColumn),
            3 => Some(Self::Batch),
            _ => None,
        }
    }
}

/// One entry of the engine log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A column family was created.
    CreateColumn {
        /// Assigned id.
        id: ColumnId,
        /// Column family name.
        name: String,
        /// Column family options.
        options: ColumnOptions,
    },
    /// A column family was dropped.
    DropColumn {
        /// Id of the dropped column family.
        id: ColumnId,
    },
    /// An atomic write batch.
    Batch {
        /// Operations in apply order.
        ops: Vec<BatchOp>,
    },
}

impl LogRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> LogRecordKind {
        match self {
            Self::CreateColumn { .. } => LogRecordKind::CreateColumn,
            Self::DropColumn { .. } => LogRecordKind::DropColumn,
            Self::Batch { .. } => LogRecordKind::Batch,
        }
    }

    /// Encodes the framed record, checksum included.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or one of its fields is too large for
    /// its length prefix.
    pub fn encode(&self) -> KvResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| KvError::corrupted(0, "record payload exceeds 4 GiB"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.kind() as u8);
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    fn encode_payload(&self) -> KvResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::CreateColumn { id, name, options } => {
                buf.extend_from_slice(&id.0.to_le_bytes());
                let name_len = u16::try_from(name.len())
                    .map_err(|_| KvError::corrupted(0, "column family name too long"))?;
                buf.extend_from_slice(&name_len.to_le_bytes());
                buf.extend_from_slice(name.as_bytes());
                match options.max_value_size {
                    Some(limit) => {
                        buf.push(1);
                        buf.extend_from_slice(&(limit as u64).to_le_bytes());
                    }
                    None => buf.push(0),
                }
            }
            Self::DropColumn { id } => {
                buf.extend_from_slice(&id.0.to_le_bytes());
            }
            Self::Batch { ops } => {
                buf.extend_from_slice(&op_count(ops.len())?.to_le_bytes());
                for op in ops {
                    match op {
                        BatchOp::Put { column, key, value } => {
                            buf.push(OP_PUT);
                            buf.extend_from_slice(&column.0.to_le_bytes());
                            put_bytes(&mut buf, key)?;
                            put_bytes(&mut buf, value)?;
                        }
                        BatchOp::Delete { column, key } => {
                            buf.push(OP_DELETE);
                            buf.extend_from_slice(&column.0.to_le_bytes());
                            put_bytes(&mut buf, key)?;
                        }
                        BatchOp::Truncate { column } => {
                            buf.push(OP_TRUNCATE);
                            buf.extend_from_slice(&column.0.to_le_bytes());
                        }
                    }
                }
            }
        }
        Ok(buf)
    }

    fn decode_payload(kind: LogRecordKind, payload: &[u8], offset: u64) -> KvResult<Self> {
        let mut cursor = Cursor {
            data: payload,
            pos: 0,
            offset,
        };
        let record = match kind {
            LogRecordKind::CreateColumn => {
                let id = ColumnId(cursor.u32()?);
                let name_len = cursor.u16()? as usize;
                let name = String::from_utf8(cursor.take(name_len)?.to_vec())
                    .map_err(|_| KvError::corrupted(offset, "column family name is not UTF-8"))?;
                let max_value_size = match cursor.u8()? {
                    0 => None,
                    _ => Some(cursor.u64()? as usize),
                };
                Self::CreateColumn {
                    id,
                    name,
                    options: ColumnOptions { max_value_size },
                }
            }
            LogRecordKind::DropColumn => Self::DropColumn {
                id: ColumnId(cursor.u32()?),
            },
            LogRecordKind::Batch => {
                let count = cursor.u32()? as usize;
                let mut ops = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let tag = cursor.u8()?;
                    let column = ColumnId(cursor.u32()?);
                    let op = match tag {
                        OP_PUT => BatchOp::Put {
                            column,
                            key: cursor.bytes()?,
                            value: cursor.bytes()?,
                        },
                        OP_DELETE => BatchOp::Delete {
                            column,
                            key: cursor.bytes()?,
                        },
                        OP_TRUNCATE => BatchOp::Truncate { column },
                        other => {
                            return Err(KvError::corrupted(
                                offset,
                                format!("unknown batch operation {other}"),
                            ))
                        }
                    };
                    ops.push(op);
                }
                Self::Batch { ops }
            }
        };
        if cursor.pos != payload.len() {
            return Err(KvError::corrupted(offset, "trailing bytes in record payload"));
        }
        Ok(record)
    }
}

fn op_count(len: usize) -> KvResult<u32> {
    u32::try_from(len)
        .map_err(|_| KvError::corrupted(0, "batch holds more than u32::MAX operations"))
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> KvResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| KvError::corrupted(0, "key or value exceeds 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> KvResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| KvError::corrupted(self.offset, "unexpected end of payload"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> KvResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> KvResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> KvResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> KvResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> KvResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn bytes(&mut self) -> KvResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Iterates over the records of a log image.
///
/// Yields `(offset, record)` pairs. Iteration stops quietly at a torn tail
/// (see [`LogReader::torn_tail`]) and after the first fatal error.
pub struct LogReader<'a> {
    data: &'a [u8],
    pos: usize,
    torn: bool,
    failed: bool,
}

impl<'a> LogReader<'a> {
    /// Creates a reader over a full log image.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            torn: false,
            failed: false,
        }
    }

    /// Offset just past the last complete, valid record.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.pos as u64
    }

    /// Whether the log ends in an incomplete record.
    #[must_use]
    pub fn torn_tail(&self) -> bool {
        self.torn
    }

    fn read_next(&mut self) -> KvResult<Option<(u64, LogRecord)>> {
        let remaining = &self.data[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }
        let offset = self.pos as u64;
        if remaining.len() < HEADER_SIZE {
            self.torn = true;
            return Ok(None);
        }
        if remaining[0..4] != LOG_MAGIC {
            return Err(KvError::corrupted(offset, "invalid record magic"));
        }
        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version != LOG_VERSION {
            return Err(KvError::corrupted(
                offset,
                format!("unsupported log version {version}"),
            ));
        }
        let kind = LogRecordKind::from_byte(remaining[6]).ok_or_else(|| {
            KvError::corrupted(offset, format!("unknown record kind {}", remaining[6]))
        })?;
        let len =
            u32::from_le_bytes([remaining[7], remaining[8], remaining[9], remaining[10]]) as usize;

        let total = HEADER_SIZE + len + CRC_SIZE;
        if remaining.len() < total {
            self.torn = true;
            return Ok(None);
        }

        let body_end = HEADER_SIZE + len;
        let expected = u32::from_le_bytes([
            remaining[body_end],
            remaining[body_end + 1],
            remaining[body_end + 2],
            remaining[body_end + 3],
        ]);
        let actual = crc32fast::hash(&remaining[..body_end]);
        if expected != actual {
            return Err(KvError::ChecksumMismatch {
                offset,
                expected,
                actual,
            });
        }

        let record = LogRecord::decode_payload(kind, &remaining[HEADER_SIZE..body_end], offset)?;
        self.pos += total;
        Ok(Some((offset, record)))
    }
}

impl Iterator for LogReader<'_> {
    type Item = KvResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_next() {
            Ok(item) => item.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Result of checking every record of a log image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Complete, valid records.
    pub records: usize,
    /// `CreateColumn` records.
    pub column_creates: usize,
    /// `DropColumn` records.
    pub column_drops: usize,
    /// `Batch` records.
    pub batches: usize,
    /// Operations across all batches.
    pub operations: usize,
    /// Bytes covered by valid records.
    pub valid_bytes: u64,
    /// Total bytes in the image.
    pub total_bytes: u64,
    /// Whether the log ends in an incomplete record.
    pub torn_tail: bool,
    /// The fatal error that stopped the scan, if any.
    pub error: Option<String>,
}

impl VerifyReport {
    /// Scans a log image.
    #[must_use]
    pub fn scan(data: &[u8]) -> Self {
        let mut report = Self {
            total_bytes: data.len() as u64,
            ..Self::default()
        };
        let mut reader = LogReader::new(data);
        for item in reader.by_ref() {
            match item {
                Ok((_, record)) => {
                    report.records += 1;
                    match record {
                        LogRecord::CreateColumn { .. } => report.column_creates += 1,
                        LogRecord::DropColumn { .. } => report.column_drops += 1,
                        LogRecord::Batch { ops } => {
                            report.batches += 1;
                            report.operations += ops.len();
                        }
                    }
                }
                Err(err) => report.error = Some(err.to_string()),
            }
        }
        report.valid_bytes = reader.valid_len();
        report.torn_tail = reader.torn_tail();
        report
    }

    /// True when every byte belongs to a valid record.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.torn_tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> LogRecord {
        LogRecord::Batch {
            ops: vec![
                BatchOp::Put {
                    column: ColumnId(1),
                    key: b"alice".to_vec(),
                    value: b"42".to_vec(),
                },
                BatchOp::Delete {
                    column: ColumnId(1),
                    key: b"bob".to_vec(),
                },
                BatchOp::Truncate {
                    column: ColumnId(2),
                },
            ],
        }
    }

    fn log(records: &[LogRecord]) -> Vec<u8> {
        records.iter().flat_map(|r| r.encode().unwrap()).collect()
    }

    #[test]
    fn reader_yields_records_with_offsets() {
        let create = LogRecord::CreateColumn {
            id: ColumnId(1),
            name: "accounts.by_name".into(),
            options: ColumnOptions::new().max_value_size(128),
        };
        let first_len = create.encode().unwrap().len() as u64;
        let data = log(&[create.clone(), batch()]);

        let records: Vec<_> = LogReader::new(&data).map(|r| r.unwrap()).collect();
        assert_eq!(records, vec![(0, create), (first_len, batch())]);
    }

    #[test]
    fn torn_tail_ends_replay_cleanly() {
        let mut data = log(&[batch(), batch()]);
        let full = data.len();
        data.truncate(full - 3);

        let mut reader = LogReader::new(&data);
        assert_eq!(reader.by_ref().count(), 1);
        assert!(reader.torn_tail());
        assert_eq!(reader.valid_len() as usize, full / 2);
    }

    #[test]
    fn checksum_mismatch_is_fatal() {
        let mut data = log(&[batch()]);
        data[HEADER_SIZE + 2] ^= 0xFF;

        let items: Vec<_> = LogReader::new(&data).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(KvError::ChecksumMismatch { .. })));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut data = log(&[batch()]);
        data[0] = b'X';
        let report = VerifyReport::scan(&data);
        assert!(report.error.is_some());
        assert_eq!(report.records, 0);
    }

    #[test]
    fn op_count_refuses_oversized_batches() {
        assert_eq!(op_count(3).unwrap(), 3);
        assert_eq!(op_count(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(op_count(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn batch_encodes_its_op_count() {
        let data = batch().encode().unwrap();
        let count = &data[HEADER_SIZE..HEADER_SIZE + 4];
        assert_eq!(count, 3u32.to_le_bytes());
    }

    #[test]
    fn verify_report_counts_records() {
        let data = log(&[
            LogRecord::CreateColumn {
                id: ColumnId(0),
                name: "default".into(),
                options: ColumnOptions::default(),
            },
            batch(),
            LogRecord::DropColumn { id: ColumnId(0) },
        ]);
        let report = VerifyReport::scan(&data);
        assert!(report.is_ok());
        assert_eq!(report.records, 3);
        assert_eq!(report.batches, 1);
        assert_eq!(report.operations, 3);
        assert_eq!(report.valid_bytes, data.len() as u64);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn reader_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
                let report = VerifyReport::scan(&data);
                prop_assert!(report.valid_bytes <= report.total_bytes);
            }

            #[test]
            fn every_prefix_is_clean_or_torn(cut in 0usize..200) {
                let data = log(&[batch(), batch()]);
                let cut = cut.min(data.len());
                let report = VerifyReport::scan(&data[..cut]);
                prop_assert!(report.error.is_none());
                prop_assert_eq!(report.torn_tail, report.valid_bytes != cut as u64);
            }
        }
    }
}
