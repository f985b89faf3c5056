//! Merkle Commitments over Relay Work
//!
//! Binary Merkle tree using SHA-256 over relay proof digests. Claims commit
//! to its root; audits reveal one leaf, its cousin (the leaf sharing its
//! parent) and the sibling path to the root.
//!
//! The tree is padded to a power of two with an empty hash, so a tree over
//! `n` relays has exactly `ceil(log2(n))` levels above the leaves. The leaf
//! position is read from the bits of the proof index, so paths carry no
//! left/right flags.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::core::hash::Hash;
use super::relay::RelayProof;

/// Domain separator for Merkle tree leaf nodes.
const MERKLE_LEAF_DOMAIN: &[u8] = b"RELAY_AUDIT_MERKLE_LEAF_V1";

/// Domain separator for Merkle tree internal nodes.
const MERKLE_NODE_DOMAIN: &[u8] = b"RELAY_AUDIT_MERKLE_NODE_V1";

/// Empty hash for padding (hash of empty domain).
pub fn empty_hash() -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(b"RELAY_AUDIT_MERKLE_EMPTY_V1");
    hasher.finalize().into()
}

/// Authentication path for one revealed leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the revealed leaf.
    pub index: u64,
    /// Sibling digests from the leaf level up to (excluding) the root.
    pub hash_sums: Vec<Hash>,
}

/// Number of levels above the leaves for `total_relays` leaves.
///
/// Equals `ceil(log2(total_relays))`; zero for zero or one leaf.
pub fn levels_for(total_relays: u64) -> usize {
    if total_relays <= 1 {
        return 0;
    }
    (u64::BITS - (total_relays - 1).leading_zeros()) as usize
}

/// Position of the cousin of `index` in a tree of `total_relays` leaves.
///
/// When the sibling slot is padding, the leaf is its own cousin.
pub fn cousin_index(index: u64, total_relays: u64) -> u64 {
    let sibling = index ^ 1;
    if sibling < total_relays {
        sibling
    } else {
        index
    }
}

/// Binary Merkle tree over relay proofs.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Leaf hashes (level 0, unpadded)
    leaves: Vec<Hash>,
    /// All tree levels (padded leaves at index 0, root at last index)
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree over relay proofs in cache order.
    pub fn from_relays(relays: &[RelayProof]) -> Self {
        let leaves = relays.iter().map(leaf_hash).collect();
        Self::from_leaf_hashes(leaves)
    }

    /// Build a tree from pre-hashed leaves.
    pub fn from_leaf_hashes(leaves: Vec<Hash>) -> Self {
        let mut tree = Self {
            leaves,
            levels: Vec::new(),
        };
        tree.build();
        tree
    }

    fn build(&mut self) {
        self.levels.clear();
        if self.leaves.is_empty() {
            return;
        }

        let mut current_level = self.leaves.clone();

        // Pad to power of 2 for balanced tree
        let target_size = current_level.len().next_power_of_two();
        current_level.resize(target_size, empty_hash());

        self.levels.push(current_level.clone());

        while current_level.len() > 1 {
            let next_level: Vec<Hash> = current_level
                .chunks(2)
                .map(|pair| hash_nodes(&pair[0], &pair[1]))
                .collect();

            self.levels.push(next_level.clone());
            current_level = next_level;
        }
    }

    /// Root hash. Empty hash for an empty tree.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(empty_hash)
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Generate the authentication path for the leaf at `index`.
    ///
    /// Returns None if index is out of bounds.
    pub fn generate_proof(&self, index: u64) -> Option<MerkleProof> {
        let position = usize::try_from(index).ok()?;
        if position >= self.leaves.len() {
            return None;
        }

        let mut hash_sums = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut current = position;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            hash_sums.push(level[current ^ 1]);
            current /= 2;
        }

        Some(MerkleProof { index, hash_sums })
    }
}

/// Compute the root committed by a claim over `relays`.
pub fn build_root(relays: &[RelayProof]) -> Hash {
    MerkleTree::from_relays(relays).root()
}

/// Check that `leaf` sits at `proof.index` under `root` with `cousin` as
/// its sibling leaf, in a tree of `total_relays` leaves.
pub fn validate(
    root: &Hash,
    leaf: &RelayProof,
    cousin: &RelayProof,
    proof: &MerkleProof,
    total_relays: u64,
) -> bool {
    if proof.index >= total_relays || proof.hash_sums.len() != levels_for(total_relays) {
        return false;
    }

    let leaf_digest = leaf_hash(leaf);
    let cousin_digest = leaf_hash(cousin);

    let expected_sibling = if cousin_index(proof.index, total_relays) == proof.index {
        // Padding sibling (or single-leaf tree): the cousin must be the leaf itself.
        if cousin_digest != leaf_digest {
            return false;
        }
        empty_hash()
    } else {
        cousin_digest
    };

    if let Some(first) = proof.hash_sums.first() {
        if *first != expected_sibling {
            return false;
        }
    }

    let mut current_hash = leaf_digest;
    for (level, sibling) in proof.hash_sums.iter().enumerate() {
        current_hash = if (proof.index >> level) & 1 == 0 {
            hash_nodes(&current_hash, sibling)
        } else {
            hash_nodes(sibling, &current_hash)
        };
    }

    current_hash == *root
}

/// Hash a relay proof into a leaf with domain separation.
pub fn leaf_hash(relay: &RelayProof) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(MERKLE_LEAF_DOMAIN);
    hasher.update(relay.hash());
    hasher.finalize().into()
}

/// Hash two child nodes with domain separation.
fn hash_nodes(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(MERKLE_NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::relay::{public_key_hex, Token};
    use ed25519_dalek::SigningKey;

    fn relays(n: u64) -> Vec<RelayProof> {
        let app = SigningKey::from_bytes(&[1; 32]);
        let client = SigningKey::from_bytes(&[2; 32]);
        let token = Token::issue(&app, public_key_hex(&client));
        (0..n)
            .map(|i| RelayProof::new(i, 10, "servicer", "0001", token.clone()).signed(&client))
            .collect()
    }

    fn reveal(tree: &MerkleTree, relays: &[RelayProof], index: u64) -> (MerkleProof, RelayProof, RelayProof) {
        let total = relays.len() as u64;
        let proof = tree.generate_proof(index).unwrap();
        let leaf = relays[index as usize].clone();
        let cousin = relays[cousin_index(index, total) as usize].clone();
        (proof, leaf, cousin)
    }

    #[test]
    fn test_levels_for() {
        assert_eq!(levels_for(0), 0);
        assert_eq!(levels_for(1), 0);
        assert_eq!(levels_for(2), 1);
        assert_eq!(levels_for(3), 2);
        assert_eq!(levels_for(4), 2);
        assert_eq!(levels_for(5), 3);
        assert_eq!(levels_for(8), 3);
        assert_eq!(levels_for(9), 4);
        assert_eq!(levels_for(1 << 40), 40);
        assert_eq!(levels_for((1 << 40) + 1), 41);
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::from_relays(&[]);
        assert_eq!(tree.root(), empty_hash());
        assert!(tree.generate_proof(0).is_none());
    }

    #[test]
    fn test_root_determinism() {
        let relays = relays(6);
        assert_eq!(build_root(&relays), build_root(&relays));
        assert_ne!(build_root(&relays), build_root(&relays[..5]));
    }

    #[test]
    fn test_every_leaf_validates() {
        for n in 1..=9u64 {
            let relays = relays(n);
            let tree = MerkleTree::from_relays(&relays);
            let root = tree.root();

            for index in 0..n {
                let (proof, leaf, cousin) = reveal(&tree, &relays, index);
                assert_eq!(proof.hash_sums.len(), levels_for(n));
                assert!(validate(&root, &leaf, &cousin, &proof, n), "n={} index={}", n, index);
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let relays = relays(5);
        let tree = MerkleTree::from_relays(&relays);
        let (proof, _, cousin) = reveal(&tree, &relays, 2);

        assert!(!validate(&tree.root(), &relays[4], &cousin, &proof, 5));
    }

    #[test]
    fn test_wrong_cousin_fails() {
        let relays = relays(5);
        let tree = MerkleTree::from_relays(&relays);
        let (proof, leaf, _) = reveal(&tree, &relays, 2);

        assert!(!validate(&tree.root(), &leaf, &relays[0], &proof, 5));
    }

    #[test]
    fn test_padding_cousin_must_be_leaf() {
        // Index 4 of 5: its sibling slot is padding.
        let relays = relays(5);
        let tree = MerkleTree::from_relays(&relays);
        let (proof, leaf, cousin) = reveal(&tree, &relays, 4);

        assert_eq!(cousin, leaf);
        assert!(validate(&tree.root(), &leaf, &cousin, &proof, 5));
        assert!(!validate(&tree.root(), &leaf, &relays[3], &proof, 5));
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let relays = relays(4);
        let tree = MerkleTree::from_relays(&relays);
        let (mut proof, leaf, cousin) = reveal(&tree, &relays, 3);
        proof.index = 4;

        assert!(!validate(&tree.root(), &leaf, &cousin, &proof, 4));
    }

    #[test]
    fn test_depth_mismatch_fails() {
        let relays = relays(5);
        let tree = MerkleTree::from_relays(&relays);
        let (mut proof, leaf, cousin) = reveal(&tree, &relays, 1);
        proof.hash_sums.pop();

        assert!(!validate(&tree.root(), &leaf, &cousin, &proof, 5));
    }

    #[test]
    fn test_proof_for_other_root_fails() {
        let relays = relays(4);
        let tree = MerkleTree::from_relays(&relays);
        let other = MerkleTree::from_relays(&relays[..3]);
        let (proof, leaf, cousin) = reveal(&tree, &relays, 0);

        assert!(!validate(&other.root(), &leaf, &cousin, &proof, 4));
    }

    #[test]
    fn test_large_tree() {
        let relays = relays(100);
        let tree = MerkleTree::from_relays(&relays);
        let root = tree.root();

        for i in [0, 50, 99] {
            let (proof, leaf, cousin) = reveal(&tree, &relays, i);
            assert!(validate(&root, &leaf, &cousin, &proof, 100));
        }
        assert!(tree.generate_proof(100).is_none());
    }
}
