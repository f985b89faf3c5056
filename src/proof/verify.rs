//! Proof Verification
//!
//! Validates a revealed relay against the claim it settles. Checks run in a
//! fixed order and stop at the first failure:
//!
//! 1. revealed index equals the recomputed audit index
//! 2. path depth equals `ceil(log2(total_relays))`
//! 3. leaf and cousin hash into the committed root
//! 4. the leaf's application token is valid
//! 5. the client signature over the leaf verifies
//!
//! Verification has no side effects; settlement is the caller's job.

use thiserror::Error;

use crate::core::hash::Hash;
use crate::error::FatalError;
use crate::ledger::claims::ClaimRecord;
use super::merkle::{self, MerkleProof};
use super::relay::{verify_signature, RelayProof, SignatureError, TokenError};
use super::selector::AuditIndexSelector;

/// Why a reveal was rejected.
#[derive(Debug, Error)]
pub enum ProofError {
    /// Wrong leaf revealed, or path depth does not match the claimed size.
    #[error("invalid proofs: {0}")]
    InvalidProofs(InvalidProofs),

    /// Path does not hash to the committed root.
    #[error("merkle verification failed")]
    InvalidMerkleVerify,

    /// Leaf token rejected.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Leaf signature rejected.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Audit index could not be derived.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Detail for [`ProofError::InvalidProofs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidProofs {
    /// Revealed index differs from the audit index.
    WrongIndex {
        /// Index the protocol demands.
        expected: u64,
        /// Index revealed.
        got: u64,
    },
    /// Path length differs from the claimed tree depth.
    WrongDepth {
        /// `ceil(log2(total_relays))`.
        expected: usize,
        /// Path length revealed.
        got: usize,
    },
}

impl std::fmt::Display for InvalidProofs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongIndex { expected, got } => {
                write!(f, "revealed index {} but audit index is {}", got, expected)
            }
            Self::WrongDepth { expected, got } => {
                write!(f, "path has {} levels, claim requires {}", got, expected)
            }
        }
    }
}

/// Verifier bound to the audit block of one claim.
#[derive(Clone, Debug)]
pub struct ProofVerifier {
    selector: AuditIndexSelector,
    audit_block_hash: Hash,
}

impl ProofVerifier {
    /// Create a verifier.
    ///
    /// `audit_block_hash` must be the last-block-id hash recorded in the
    /// block at `selector.audit_height(&claim.session_header)`.
    pub fn new(selector: AuditIndexSelector, audit_block_hash: Hash) -> Self {
        Self {
            selector,
            audit_block_hash,
        }
    }

    /// Audit index the claim must reveal.
    pub fn audit_index(&self, claim: &ClaimRecord) -> Result<u64, FatalError> {
        self.selector
            .select(&claim.session_header, claim.total_relays, &self.audit_block_hash)
    }

    /// Validate a reveal against its claim.
    pub fn verify(
        &self,
        claim: &ClaimRecord,
        proof: &MerkleProof,
        leaf: &RelayProof,
        cousin: &RelayProof,
    ) -> Result<(), ProofError> {
        let expected = self.audit_index(claim)?;
        if expected != proof.index {
            return Err(ProofError::InvalidProofs(InvalidProofs::WrongIndex {
                expected,
                got: proof.index,
            }));
        }

        let depth = merkle::levels_for(claim.total_relays);
        if proof.hash_sums.len() != depth {
            return Err(ProofError::InvalidProofs(InvalidProofs::WrongDepth {
                expected: depth,
                got: proof.hash_sums.len(),
            }));
        }

        if !merkle::validate(&claim.merkle_root, leaf, cousin, proof, claim.total_relays) {
            return Err(ProofError::InvalidMerkleVerify);
        }

        leaf.token.validate()?;

        verify_signature(&leaf.token.client_public_key, &leaf.hash_string(), &leaf.signature)?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::{Address, SessionHeader};
    use crate::proof::merkle::{cousin_index, MerkleTree};
    use crate::proof::relay::{public_key_hex, Token};
    use ed25519_dalek::SigningKey;

    /// Claim, relays and a verifier whose audit index lands inside the tree.
    pub(crate) struct Fixture {
        pub claim: ClaimRecord,
        pub relays: Vec<RelayProof>,
        pub tree: MerkleTree,
        pub verifier: ProofVerifier,
    }

    impl Fixture {
        pub fn new(total: u64) -> Self {
            let app = SigningKey::from_bytes(&[1; 32]);
            let client = SigningKey::from_bytes(&[2; 32]);
            let token = Token::issue(&app, public_key_hex(&client));
            let header = SessionHeader::new(public_key_hex(&app), "0001", 100);

            let relays: Vec<RelayProof> = (0..total)
                .map(|i| RelayProof::new(i, 100, "servicer", "0001", token.clone()).signed(&client))
                .collect();
            let tree = MerkleTree::from_relays(&relays);
            let claim = ClaimRecord::new(Address::new([3; 20]), header, total, tree.root());

            // Pick the first block hash whose audit index is a real leaf.
            let selector = AuditIndexSelector::new(2, 10);
            let verifier = (0u8..=255)
                .map(|b| ProofVerifier::new(selector, [b; 32]))
                .find(|v| v.audit_index(&claim).unwrap() < total)
                .unwrap();

            Self { claim, relays, tree, verifier }
        }

        pub fn reveal(&self) -> (MerkleProof, RelayProof, RelayProof) {
            self.reveal_at(self.verifier.audit_index(&self.claim).unwrap())
        }

        pub fn reveal_at(&self, index: u64) -> (MerkleProof, RelayProof, RelayProof) {
            let proof = self.tree.generate_proof(index).unwrap();
            let leaf = self.relays[index as usize].clone();
            let cousin = self.relays[cousin_index(index, self.claim.total_relays) as usize].clone();
            (proof, leaf, cousin)
        }
    }

    #[test]
    fn test_honest_reveal_passes() {
        for total in [1, 2, 5, 13, 64] {
            let fx = Fixture::new(total);
            let (proof, leaf, cousin) = fx.reveal();
            fx.verifier.verify(&fx.claim, &proof, &leaf, &cousin).unwrap();
        }
    }

    #[test]
    fn test_wrong_index_rejected_even_if_merkle_valid() {
        let fx = Fixture::new(13);
        let expected = fx.verifier.audit_index(&fx.claim).unwrap();
        let other = (expected + 1) % 13;
        let (proof, leaf, cousin) = fx.reveal_at(other);

        // The path itself is sound.
        assert!(merkle::validate(&fx.claim.merkle_root, &leaf, &cousin, &proof, 13));

        let err = fx.verifier.verify(&fx.claim, &proof, &leaf, &cousin).unwrap_err();
        assert!(matches!(
            err,
            ProofError::InvalidProofs(InvalidProofs::WrongIndex { got, .. }) if got == other
        ));
    }

    #[test]
    fn test_short_path_rejected() {
        let fx = Fixture::new(5);
        let (mut proof, leaf, cousin) = fx.reveal();
        proof.hash_sums.truncate(2);

        let err = fx.verifier.verify(&fx.claim, &proof, &leaf, &cousin).unwrap_err();
        assert!(matches!(
            err,
            ProofError::InvalidProofs(InvalidProofs::WrongDepth { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_long_path_rejected() {
        let fx = Fixture::new(5);
        let (mut proof, leaf, cousin) = fx.reveal();
        proof.hash_sums.push([0; 32]);

        let err = fx.verifier.verify(&fx.claim, &proof, &leaf, &cousin).unwrap_err();
        assert!(matches!(err, ProofError::InvalidProofs(InvalidProofs::WrongDepth { .. })));
    }

    #[test]
    fn test_tampered_sibling_fails_merkle() {
        let fx = Fixture::new(8);
        let (mut proof, leaf, cousin) = fx.reveal();
        let last = proof.hash_sums.len() - 1;
        proof.hash_sums[last] = [0xEE; 32];

        let err = fx.verifier.verify(&fx.claim, &proof, &leaf, &cousin).unwrap_err();
        assert!(matches!(err, ProofError::InvalidMerkleVerify));
    }

    #[test]
    fn test_bad_signature_surfaces_unchanged() {
        let fx = Fixture::new(4);
        let (proof, leaf, cousin) = fx.reveal();

        // Re-sign the leaf with a key the token does not name. The leaf
        // digest is unchanged, so only the signature check can fail.
        let mut forged = leaf.clone();
        forged.signature = crate::proof::relay::sign_digest(&SigningKey::from_bytes(&[9; 32]), &leaf.hash());
        let cousin = if cousin == leaf { forged.clone() } else { cousin };

        let err = fx.verifier.verify(&fx.claim, &proof, &forged, &cousin).unwrap_err();
        assert!(matches!(err, ProofError::Signature(SignatureError::VerificationFailed)));
    }

    #[test]
    fn test_bad_token_surfaces_unchanged() {
        let fx = Fixture::new(4);
        let (proof, leaf, cousin) = fx.reveal();

        let mut claim = fx.claim.clone();
        let mut bad_leaf = leaf.clone();
        bad_leaf.token.version = "0.0.0".into();
        let mut relays = fx.relays.clone();
        let index = proof.index as usize;
        relays[index] = bad_leaf.clone();
        let tree = MerkleTree::from_relays(&relays);
        claim.merkle_root = tree.root();
        let proof = tree.generate_proof(proof.index).unwrap();
        let cousin = if cousin == leaf { bad_leaf.clone() } else { cousin };

        let err = fx.verifier.verify(&claim, &proof, &bad_leaf, &cousin).unwrap_err();
        assert!(matches!(err, ProofError::Token(TokenError::UnsupportedVersion(_))));
    }
}
