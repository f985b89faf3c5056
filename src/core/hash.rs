//! Deterministic Hashing
//!
//! SHA-256 helpers shared by the consensus path:
//! - Session header digests (ledger keys, audit seed)
//! - Relay proof and token digests (signature messages, merkle leaves)
//! - Block hash derivation for the simulated chain

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type Hash = [u8; 32];

/// Length of a [`Hash`] in bytes.
pub const HASH_LEN: usize = 32;

/// Deterministic field hasher.
///
/// Wraps SHA-256 with helpers for the record fields the engine digests.
/// Strings are length-prefixed so adjacent fields cannot alias.
/// Order of updates is critical for determinism.
pub struct AuditHasher {
    hasher: Sha256,
}

impl AuditHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for session headers.
    pub fn for_session_header() -> Self {
        Self::new(b"RELAY_AUDIT_SESSION_HEADER_V1")
    }

    /// Create hasher for relay proofs.
    pub fn for_relay_proof() -> Self {
        Self::new(b"RELAY_AUDIT_RELAY_PROOF_V1")
    }

    /// Create hasher for application authentication tokens.
    pub fn for_token() -> Self {
        Self::new(b"RELAY_AUDIT_TOKEN_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Hash {
        self.hasher.finalize().into()
    }
}

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex rendering of a hash.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}
