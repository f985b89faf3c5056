//! Audit Index Selection
//!
//! Derives which relay a servicer must reveal for a claim. The seed is the
//! hash of a block produced after the waiting period, so the index is
//! unknowable when the claim is committed, yet every validator derives the
//! same value when the proof is applied.
//!
//! ## Derivation
//!
//! ```text
//! seed        = json({ block_hash: hex(last block id of audit block), header: header.hash_string() })
//! proofs_hash = hex(sha256(seed))[0..15]
//! i           = largest i in 15..=1 with parse_hex(proofs_hash[0..i]) <= total_relays
//! index       = parse_hex(proofs_hash[0..(parse_hex(proofs_hash[0]) % i + 1)])
//! ```
//!
//! The result is bounded by `total_relays` inclusively: when the selected
//! prefix is the whole `i` characters and equals `total_relays`, the index
//! is one past the last leaf. Such a claim cannot be proven. The rule is
//! consensus-critical and kept exactly as deployed.

use serde::Serialize;

use crate::config::AuditParams;
use crate::core::hash::{Hash, hash_bytes, to_hex};
use crate::core::types::{BlockHeight, SessionHeader};
use crate::error::FatalError;

/// Number of hex characters of the seed digest used for selection.
pub const PROOFS_HASH_LEN: usize = 15;

/// Canonical seed record.
#[derive(Serialize)]
struct AuditSeed<'a> {
    block_hash: String,
    header: &'a str,
}

/// Audit index derivation for one set of lifecycle params.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuditIndexSelector {
    /// Sessions between the session start and the audit block.
    pub waiting_period_sessions: u64,
    /// Blocks per session.
    pub session_frequency_blocks: u64,
}

impl AuditIndexSelector {
    /// Create a selector.
    pub const fn new(waiting_period_sessions: u64, session_frequency_blocks: u64) -> Self {
        Self {
            waiting_period_sessions,
            session_frequency_blocks,
        }
    }

    /// Height of the block whose header seeds the audit of `header`.
    pub fn audit_height(&self, header: &SessionHeader) -> BlockHeight {
        header.session_block_height.saturating_add(
            self.waiting_period_sessions
                .saturating_mul(self.session_frequency_blocks),
        )
    }

    /// Select the audit index.
    ///
    /// `future_block_hash` is the last-block-id hash recorded in the block
    /// at [`AuditIndexSelector::audit_height`].
    pub fn select(
        &self,
        header: &SessionHeader,
        total_relays: u64,
        future_block_hash: &Hash,
    ) -> Result<u64, FatalError> {
        let proofs_hash = proofs_hash(future_block_hash, header)?;
        index_from_proofs_hash(&proofs_hash, total_relays)
    }
}

impl From<&AuditParams> for AuditIndexSelector {
    fn from(params: &AuditParams) -> Self {
        Self::new(params.waiting_period_sessions, params.session_frequency_blocks)
    }
}

/// Hex prefix of the seed digest.
pub fn proofs_hash(future_block_hash: &Hash, header: &SessionHeader) -> Result<String, FatalError> {
    let header_hash = header.hash_string();
    let seed = AuditSeed {
        block_hash: to_hex(future_block_hash),
        header: &header_hash,
    };
    let bytes = serde_json::to_vec(&seed).map_err(|e| FatalError::Encode {
        what: "audit seed",
        reason: e.to_string(),
    })?;

    let mut digest = to_hex(&hash_bytes(&bytes));
    digest.truncate(PROOFS_HASH_LEN);
    Ok(digest)
}

/// Apply the selection rule to a [`PROOFS_HASH_LEN`]-character hex prefix.
///
/// Returns 0 if no prefix length is small enough.
pub fn index_from_proofs_hash(proofs_hash: &str, total_relays: u64) -> Result<u64, FatalError> {
    if proofs_hash.len() != PROOFS_HASH_LEN {
        return Err(FatalError::MalformedDigest(proofs_hash.to_string()));
    }

    for i in (1..=PROOFS_HASH_LEN).rev() {
        let max_value = parse_hex_prefix(proofs_hash, i)?;
        if total_relays >= max_value {
            let first_character = parse_hex_prefix(proofs_hash, 1)?;
            let selection = (first_character % i as u64 + 1) as usize;
            return parse_hex_prefix(proofs_hash, selection);
        }
    }

    Ok(0)
}

fn parse_hex_prefix(s: &str, len: usize) -> Result<u64, FatalError> {
    s.get(..len)
        .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
        .ok_or_else(|| FatalError::MalformedDigest(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header() -> SessionHeader {
        SessionHeader::new("ab".repeat(32), "0001", 100)
    }

    #[test]
    fn test_audit_height() {
        let selector = AuditIndexSelector::new(2, 10);
        assert_eq!(selector.audit_height(&header()), 120);
    }

    #[test]
    fn test_selector_from_params() {
        let params = AuditParams::new(2, 10, 5);
        assert_eq!(AuditIndexSelector::from(&params), AuditIndexSelector::new(2, 10));
    }

    #[test]
    fn test_proofs_hash_shape() {
        let digest = proofs_hash(&[9; 32], &header()).unwrap();
        assert_eq!(digest.len(), PROOFS_HASH_LEN);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_seed_depends_on_block_and_header() {
        let a = proofs_hash(&[9; 32], &header()).unwrap();
        let b = proofs_hash(&[8; 32], &header()).unwrap();
        let c = proofs_hash(&[9; 32], &SessionHeader::new("ab".repeat(32), "0001", 101)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_selection_walkthrough() {
        // i = 2 is the first prefix with "3a" (58) <= 100; 3 % 2 + 1 = 2 -> "3a".
        assert_eq!(index_from_proofs_hash("3a0000000000000", 100).unwrap(), 58);
        // i = 1 selected ("3" <= 5 but "3a" > 5); 3 % 1 + 1 = 1 -> "3".
        assert_eq!(index_from_proofs_hash("3a0000000000000", 5).unwrap(), 3);
        // i = 3 ("abc" = 2748 <= 3000); 10 % 3 + 1 = 2 -> "ab".
        assert_eq!(index_from_proofs_hash("abcffffffffffff", 3000).unwrap(), 0xab);
    }

    #[test]
    fn test_no_prefix_small_enough_returns_zero() {
        assert_eq!(index_from_proofs_hash("f00000000000000", 3).unwrap(), 0);
        assert_eq!(index_from_proofs_hash("100000000000000", 0).unwrap(), 0);
    }

    #[test]
    fn test_index_can_equal_total_relays() {
        // Documents the deployed rule: "3" <= 3 selects i = 1 and the
        // index 3 is one past the last leaf of a three-leaf claim.
        let index = index_from_proofs_hash("300000000000000", 3).unwrap();
        assert_eq!(index, 3);
        assert!(index >= 3);
    }

    #[test]
    fn test_malformed_digest_is_fatal() {
        assert!(matches!(
            index_from_proofs_hash("xyz000000000000", 10),
            Err(FatalError::MalformedDigest(_))
        ));
        assert!(matches!(
            index_from_proofs_hash("abc", 10),
            Err(FatalError::MalformedDigest(_))
        ));
    }

    #[test]
    fn test_two_validators_agree() {
        let a = AuditIndexSelector::new(3, 4);
        let b = AuditIndexSelector::new(3, 4);
        let hash = [0x5a; 32];
        for total in [1, 2, 5, 17, 1_000, 1_000_000] {
            assert_eq!(
                a.select(&header(), total, &hash).unwrap(),
                b.select(&header(), total, &hash).unwrap()
            );
        }
    }

    proptest! {
        #[test]
        fn prop_selection_is_deterministic(
            block_hash in any::<[u8; 32]>(),
            total in 1u64..1_000_000,
            height in 0u64..1_000_000,
        ) {
            let header = SessionHeader::new("cd".repeat(32), "0021", height);
            let selector = AuditIndexSelector::new(3, 4);
            let first = selector.select(&header, total, &block_hash).unwrap();
            let second = selector.select(&header, total, &block_hash).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_index_never_exceeds_total(
            block_hash in any::<[u8; 32]>(),
            total in 1u64..1_000_000,
        ) {
            let selector = AuditIndexSelector::new(3, 4);
            let index = selector.select(&header(), total, &block_hash).unwrap();
            prop_assert!(index <= total);
        }

        #[test]
        fn prop_rule_bounds_any_digest(digest in "[0-9a-f]{15}", total in 0u64..100_000) {
            let index = index_from_proofs_hash(&digest, total).unwrap();
            prop_assert!(index <= total);
        }
    }
}
