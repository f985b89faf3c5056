//! Record Codec
//!
//! Bincode encoding for stored records. Any failure here means consensus
//! state is corrupt or unencodable and is reported as [`FatalError`].

use serde::{de::DeserializeOwned, Serialize};

use crate::error::FatalError;

/// Encode a record for storage.
pub fn marshal<T: Serialize>(what: &'static str, record: &T) -> Result<Vec<u8>, FatalError> {
    bincode::serialize(record).map_err(|e| FatalError::Encode {
        what,
        reason: e.to_string(),
    })
}

/// Decode a stored record.
pub fn unmarshal<T: DeserializeOwned>(what: &'static str, key: &[u8], bytes: &[u8]) -> Result<T, FatalError> {
    bincode::deserialize(bytes).map_err(|e| FatalError::Decode {
        what,
        key: hex::encode(key),
        reason: e.to_string(),
    })
}
