//! Servicer automation (non-deterministic).
//!
//! Local bookkeeping of served relays and the per-block scheduler that
//! turns it into claim and proof transactions.

pub mod cache;
pub mod submit;
pub mod scheduler;

pub use cache::{WorkCache, SessionWork, Reveal};
pub use submit::{ClaimSubmitter, ProofSubmitter, ChannelSubmitter, Transaction, TxResponse, SubmitError};
pub use scheduler::{SubmissionScheduler, SchedulerError, PassReport, CycleReport};
