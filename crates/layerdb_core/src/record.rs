//! Record payload encoding.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can live in a container.
///
/// Implemented for every `Clone + Serialize + DeserializeOwned` type that
/// can cross threads. Payloads are stored as CBOR.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Encodes a record payload.
///
/// # Errors
///
/// Returns [`CoreError::Codec`] if serialization fails.
pub fn encode<V: Record>(value: &V) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a record payload.
///
/// # Errors
///
/// Returns [`CoreError::Codec`] if the bytes are not a valid encoding of `V`.
pub fn decode<V: Record>(bytes: &[u8]) -> CoreResult<V> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: u64,
        name: String,
    }

    #[test]
    fn payload_roundtrip() {
        let account = Account {
            id: 7,
            name: "alice".into(),
        };
        let bytes = encode(&account).unwrap();
        assert_eq!(decode::<Account>(&bytes).unwrap(), account);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let result = decode::<Account>(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(CoreError::Codec { .. })));
    }
}
