//! Proof of Relay
//!
//! Commit-then-reveal audit of relay work:
//! - Relay proofs and application tokens (ed25519)
//! - Merkle commitments over a session's relays
//! - Audit index selection from a future block hash
//! - Verification of a revealed leaf against its claim
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  relay.rs        - Relay proofs, tokens, signatures         │
//! │  merkle.rs       - Padded binary Merkle tree                │
//! │  selector.rs     - Pseudorandom audit index                 │
//! │  verify.rs       - Ordered reveal checks                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod relay;
pub mod merkle;
pub mod selector;
pub mod verify;

// Re-export key types
pub use relay::{RelayProof, Token, TokenError, SignatureError, verify_signature};
pub use merkle::{MerkleTree, MerkleProof};
pub use selector::AuditIndexSelector;
pub use verify::{ProofVerifier, ProofError, InvalidProofs};
