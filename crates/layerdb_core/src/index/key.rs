//! Index key types.

use crate::error::{CoreError, CoreResult};
use std::hash::Hash;

/// A key that keyed layers can index by.
///
/// Index keys must be:
/// - Hashable (for [`crate::HashedIndex`])
/// - Orderable (for [`crate::OrderedIndex`])
/// - Serializable to bytes (for the layer's column family)
pub trait IndexKey: Clone + Eq + Hash + Ord + Send + Sync + 'static {
    /// Serializes the key to bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Deserializes the key from bytes.
    fn from_bytes(bytes: &[u8]) -> CoreResult<Self>;
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> CoreResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| CoreError::invalid_format(format!("expected {N} bytes for {what}")))
}

impl IndexKey for u32 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(u32::from_be_bytes(fixed(bytes, "u32")?))
    }
}

impl IndexKey for u64 {
    fn to_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(u64::from_be_bytes(fixed(bytes, "u64")?))
    }
}

// Sign bit flipped so byte order matches numeric order.
impl IndexKey for i64 {
    fn to_bytes(&self) -> Vec<u8> {
        ((*self as u64) ^ (1 << 63)).to_be_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok((u64::from_be_bytes(fixed(bytes, "i64")?) ^ (1 << 63)) as i64)
    }
}

impl IndexKey for String {
    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|_| CoreError::invalid_format("invalid UTF-8"))
    }
}

impl IndexKey for Vec<u8> {
    fn to_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

/// Composite key.
///
/// The first component is escaped (`0x00` becomes `0x00 0xFF`) and closed by
/// `0x00 0x01`, so the bytes of two composite keys compare like the tuples
/// whenever both components' encodings do.
impl<A: IndexKey, B: IndexKey> IndexKey for (A, B) {
    fn to_bytes(&self) -> Vec<u8> {
        let first = self.0.to_bytes();
        let second = self.1.to_bytes();
        let mut out = Vec::with_capacity(first.len() + 2 + second.len());
        for byte in first {
            out.push(byte);
            if byte == 0x00 {
                out.push(0xFF);
            }
        }
        out.extend_from_slice(&[0x00, 0x01]);
        out.extend_from_slice(&second);
        out
    }

    fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut first = Vec::with_capacity(bytes.len());
        let mut iter = bytes.iter().copied().enumerate();
        while let Some((_, byte)) = iter.next() {
            if byte != 0x00 {
                first.push(byte);
                continue;
            }
            match iter.next() {
                Some((_, 0xFF)) => first.push(0x00),
                Some((end, 0x01)) => {
                    return Ok((A::from_bytes(&first)?, B::from_bytes(&bytes[end + 1..])?));
                }
                _ => return Err(CoreError::invalid_format("bad escape in composite key")),
            }
        }
        Err(CoreError::invalid_format("composite key truncated"))
    }
}
