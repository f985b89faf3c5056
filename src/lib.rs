//! # Relay Audit
//!
//! Commit-then-reveal audit of relay work on a service-relay chain.
//! Servicers commit to a Merkle root over the relays of a session, wait
//! for a future block to fix a pseudorandom leaf, then reveal that leaf to
//! get paid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RELAY AUDIT                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                        │
//! │  ├── hash.rs     - Domain-separated SHA-256                 │
//! │  ├── types.rs    - Addresses and session headers            │
//! │  └── chain.rs    - Chain context and simulated chain        │
//! │                                                             │
//! │  proof/          - Audit cryptography (deterministic)       │
//! │  ├── relay.rs    - Relay proofs and tokens                  │
//! │  ├── merkle.rs   - Session commitments                      │
//! │  ├── selector.rs - Audit index selection                    │
//! │  └── verify.rs   - Reveal verification                      │
//! │                                                             │
//! │  ledger/         - Consensus state (deterministic)          │
//! │  ├── claims.rs   - Pending claims and expiration            │
//! │  └── invoices.rs - Settled invoices                         │
//! │  keeper.rs       - Transaction handlers, begin-block sweep  │
//! │                                                             │
//! │  servicer/       - Automation (non-deterministic)           │
//! │  ├── cache.rs    - Local relay cache                        │
//! │  ├── submit.rs   - Transaction submitters                   │
//! │  └── scheduler.rs- Claim and proof passes                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/`, `proof/`, `ledger/` and `keeper.rs` run on every node:
//! - No HashMap (ordered maps and ordered store scans only)
//! - No system time or local randomness
//! - Errors from corrupt state are returned, never panicked
//!
//! Given the same store and chain context, every node reaches the same
//! ledger state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod keeper;
pub mod ledger;
pub mod proof;
pub mod servicer;
pub mod tx;

// Re-export commonly used types
pub use config::{AuditParams, NodeConfig, ParamsSchedule, ParamsSource};
pub use core::{Address, SessionHeader, ChainContext, SimulatedChain};
pub use error::FatalError;
pub use keeper::{AuditKeeper, EngineError};
pub use ledger::{ClaimRecord, StoredInvoice, MemStore};
pub use proof::{AuditIndexSelector, ProofVerifier, RelayProof};
pub use servicer::{SubmissionScheduler, WorkCache};
pub use tx::{ClaimMsg, ProofMsg};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
