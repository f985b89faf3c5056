//! Identity Types
//!
//! Addresses and session headers shared by the ledgers, the verifier
//! and the servicer automation.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use super::hash::{AuditHasher, Hash, hash_bytes, to_hex};

/// Block height on the relay chain.
pub type BlockHeight = u64;

/// Length of an [`Address`] in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Account address of a servicer (first 20 bytes of the SHA-256 of its public key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive the address owned by an ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = hash_bytes(public_key);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Get as bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// Errors parsing an address from hex.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// Not valid hex.
    #[error("invalid address hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Wrong number of bytes.
    #[error("invalid address length: expected 20 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; ADDRESS_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }
}

/// Identifies one session of relay work between an application and its servicers.
///
/// Immutable once created. Ordering is field-wise and only used to keep
/// the local work cache iteration stable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Hex-encoded public key of the application being served.
    pub application_public_key: String,

    /// Identifier of the relayed (non-native) chain.
    pub chain: String,

    /// Height of the block that opened the session.
    pub session_block_height: BlockHeight,
}

impl SessionHeader {
    /// Create a new session header.
    pub fn new(
        application_public_key: impl Into<String>,
        chain: impl Into<String>,
        session_block_height: BlockHeight,
    ) -> Self {
        Self {
            application_public_key: application_public_key.into(),
            chain: chain.into(),
            session_block_height,
        }
    }

    /// Fixed-length digest of the header.
    pub fn hash(&self) -> Hash {
        let mut hasher = AuditHasher::for_session_header();
        hasher.update_str(&self.application_public_key);
        hasher.update_str(&self.chain);
        hasher.update_u64(self.session_block_height);
        hasher.finalize()
    }

    /// Hex rendering of [`SessionHeader::hash`].
    pub fn hash_string(&self) -> String {
        to_hex(&self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_round_trip() {
        let addr = Address::new([0xAB; ADDRESS_LEN]);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_address_wrong_length() {
        let err = "abcd".parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressError::Length(2)));
    }

    #[test]
    fn test_address_from_public_key_is_stable() {
        let pk = [7u8; 32];
        assert_eq!(Address::from_public_key(&pk), Address::from_public_key(&pk));
        assert_ne!(Address::from_public_key(&pk), Address::from_public_key(&[8u8; 32]));
    }

    #[test]
    fn test_header_hash_covers_every_field() {
        let base = SessionHeader::new("aa", "0001", 100);

        let other_app = SessionHeader::new("ab", "0001", 100);
        let other_chain = SessionHeader::new("aa", "0002", 100);
        let other_height = SessionHeader::new("aa", "0001", 101);

        assert_ne!(base.hash(), other_app.hash());
        assert_ne!(base.hash(), other_chain.hash());
        assert_ne!(base.hash(), other_height.hash());
        assert_eq!(base.hash(), base.clone().hash());
    }

    #[test]
    fn test_header_hash_string_is_hex() {
        let header = SessionHeader::new("aa", "0001", 1);
        let s = header.hash_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_header_hash_layout() {
        let header = SessionHeader::new("aa", "0001", 7);

        let mut data = Vec::new();
        data.extend_from_slice(&2u64.to_le_bytes());
        data.extend_from_slice(b"aa");
        data.extend_from_slice(&4u64.to_le_bytes());
        data.extend_from_slice(b"0001");
        data.extend_from_slice(&7u64.to_le_bytes());
        let expected = crate::core::hash::hash_with_domain(b"RELAY_AUDIT_SESSION_HEADER_V1", &data);

        assert_eq!(header.hash(), expected);
        assert_eq!(header.hash_string(), to_hex(&expected));
    }
}
