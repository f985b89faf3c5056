//! Audit ledgers.
//!
//! Pending claims and settled invoices, persisted in a [`KvStore`] under
//! disjoint key prefixes. Iteration follows key order so every node walks
//! the ledgers identically.

pub mod store;
pub mod codec;
pub mod keys;
pub mod claims;
pub mod invoices;

pub use store::{KvStore, MemStore};
pub use claims::{ClaimLedger, ClaimRecord};
pub use invoices::{InvoiceLedger, StoredInvoice};
