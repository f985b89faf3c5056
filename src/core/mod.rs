//! Core primitives.
//!
//! Hashing, identifiers and the chain view shared by the consensus path
//! and the servicer automation.

pub mod hash;
pub mod types;
pub mod chain;

// Re-export core types
pub use hash::{Hash, AuditHasher, to_hex};
pub use types::{Address, BlockHeight, SessionHeader};
pub use chain::{ChainContext, SimulatedChain};
