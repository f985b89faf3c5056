//! Transaction Messages
//!
//! The two messages a servicer submits during the audit lifecycle.

use serde::{Serialize, Deserialize};

use crate::core::hash::Hash;
use crate::core::types::{Address, SessionHeader};
use crate::proof::merkle::MerkleProof;
use crate::proof::relay::RelayProof;

/// Commit to a session of relay work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimMsg {
    /// Claiming servicer.
    pub from_address: Address,
    /// Session the work was done in.
    pub session_header: SessionHeader,
    /// Relays committed to.
    pub total_relays: u64,
    /// Root over the cached relay proofs.
    pub merkle_root: Hash,
}

/// Reveal the audited relay of a mature claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMsg {
    /// Servicer settling its claim.
    pub from_address: Address,
    /// Session of the claim being settled.
    pub session_header: SessionHeader,
    /// Path from the revealed leaf to the committed root.
    pub merkle_proof: MerkleProof,
    /// Relay at the audit index.
    pub leaf: RelayProof,
    /// Relay paired with the leaf at the bottom level.
    pub cousin: RelayProof,
}
