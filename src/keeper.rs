//! Audit Keeper
//!
//! Consensus-side entry points of the audit engine. Owns the store and
//! applies the two transaction kinds plus the per-block expiration sweep.
//!
//! ```text
//!   ClaimMsg ──► handle_claim ──► ClaimLedger
//!                                     │ waiting period
//!   ProofMsg ──► handle_proof ──► ProofVerifier ──► InvoiceLedger
//!                                     │ (claim deleted in the same step)
//!   begin block ──► on_begin_block ──► sweep_expired
//! ```
//!
//! Everything here is synchronous and deterministic; the only I/O is the
//! store itself.

use thiserror::Error;
use tracing::debug;

use crate::config::ParamsSource;
use crate::core::chain::ChainContext;
use crate::core::hash::{Hash, to_hex};
use crate::core::types::{BlockHeight, SessionHeader};
use crate::error::FatalError;
use crate::ledger::claims::{ClaimLedger, ClaimRecord};
use crate::ledger::codec::marshal;
use crate::ledger::invoices::{InvoiceLedger, StoredInvoice};
use crate::ledger::keys::{claim_key, invoice_key};
use crate::ledger::store::KvStore;
use crate::proof::selector::AuditIndexSelector;
use crate::proof::verify::{ProofError, ProofVerifier};
use crate::tx::{ClaimMsg, ProofMsg};

/// Transaction rejection or halt condition.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Reveal failed verification.
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// Consensus state is corrupt.
    #[error(transparent)]
    Fatal(#[from] FatalError),

    /// Claim commits to zero relays.
    #[error("claim has no relays")]
    EmptyClaim,

    /// Chain not billable at the session height.
    #[error("chain {chain} is not supported at height {height}")]
    UnsupportedChain {
        /// Relayed chain.
        chain: String,
        /// Session height.
        height: BlockHeight,
    },

    /// Session still accepting relays.
    #[error("session at {session_height} is open until height {ends_at}")]
    SessionNotEnded {
        /// Session start.
        session_height: BlockHeight,
        /// First height at which the session is over.
        ends_at: BlockHeight,
    },

    /// Servicer already claimed this session.
    #[error("claim already exists for this session")]
    DuplicateClaim,

    /// Servicer was already paid for this session.
    #[error("session already settled")]
    AlreadySettled,

    /// No pending claim to settle.
    #[error("no claim found for this session")]
    ClaimNotFound,

    /// Proof arrived before the audit block.
    #[error("claim is not mature until height {mature_at}")]
    ClaimNotMature {
        /// First height at which a proof is accepted.
        mature_at: BlockHeight,
    },

    /// Audit block has not been produced.
    #[error("audit block at height {height} is unavailable")]
    AuditBlockUnavailable {
        /// Audit height.
        height: BlockHeight,
    },
}

impl EngineError {
    /// Should block processing halt?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Proof(ProofError::Fatal(_)))
    }
}

/// Audit state machine over a [`KvStore`].
pub struct AuditKeeper<S> {
    store: S,
}

impl<S: KvStore> AuditKeeper<S> {
    /// Create a keeper over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Release the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Read-only claim view.
    pub fn claims(&self) -> ClaimLedger<&S> {
        ClaimLedger::new(&self.store)
    }

    /// Writable claim view.
    pub fn claims_mut(&mut self) -> ClaimLedger<&mut S> {
        ClaimLedger::new(&mut self.store)
    }

    /// Read-only invoice view.
    pub fn invoices(&self) -> InvoiceLedger<&S> {
        InvoiceLedger::new(&self.store)
    }

    /// Writable invoice view.
    pub fn invoices_mut(&mut self) -> InvoiceLedger<&mut S> {
        InvoiceLedger::new(&mut self.store)
    }

    /// Begin-block hook: sweep expired claims. Returns how many were removed.
    pub fn on_begin_block<C: ChainContext + ?Sized>(&mut self, ctx: &C) -> Result<usize, FatalError> {
        let height = ctx.block_height();
        let removed = self.claims_mut().sweep_expired(height, ctx)?;
        if !removed.is_empty() {
            debug!("Swept {} expired claims at height {}", removed.len(), height);
        }
        Ok(removed.len())
    }

    /// Verifier for claims on `header`, bound to its audit block.
    pub fn verifier_for<C: ChainContext + ?Sized>(
        &self,
        ctx: &C,
        header: &SessionHeader,
    ) -> Result<ProofVerifier, EngineError> {
        let (selector, block_hash) = audit_seed(ctx, header)?;
        Ok(ProofVerifier::new(selector, block_hash))
    }

    /// Audit index of a claim of `total_relays` on `header`.
    pub fn audit_index<C: ChainContext + ?Sized>(
        &self,
        ctx: &C,
        header: &SessionHeader,
        total_relays: u64,
    ) -> Result<u64, EngineError> {
        let (selector, block_hash) = audit_seed(ctx, header)?;
        Ok(selector.select(header, total_relays, &block_hash)?)
    }

    /// Apply a claim transaction.
    pub fn handle_claim<C: ChainContext + ?Sized>(&mut self, ctx: &C, msg: ClaimMsg) -> Result<(), EngineError> {
        if msg.total_relays == 0 {
            return Err(EngineError::EmptyClaim);
        }

        let header = &msg.session_header;
        let session_height = header.session_block_height;
        if !ctx.is_supported_chain(session_height, &header.chain) {
            return Err(EngineError::UnsupportedChain {
                chain: header.chain.clone(),
                height: session_height,
            });
        }

        let ends_at = ctx.params_at(session_height).session_end_height(session_height);
        if ctx.block_height() < ends_at {
            return Err(EngineError::SessionNotEnded { session_height, ends_at });
        }

        if self.store.get(&invoice_key(&msg.from_address, header)).is_some() {
            return Err(EngineError::AlreadySettled);
        }
        if self.store.get(&claim_key(&msg.from_address, header)).is_some() {
            return Err(EngineError::DuplicateClaim);
        }

        let claim = ClaimRecord::new(msg.from_address, msg.session_header, msg.total_relays, msg.merkle_root);
        self.claims_mut().put(&claim)?;

        debug!(
            "Recorded claim of {} relays by {} for session {}",
            claim.total_relays,
            claim.from_address,
            to_hex(&claim.session_header.hash())
        );
        Ok(())
    }

    /// Apply a proof transaction, promoting the claim into an invoice.
    pub fn handle_proof<C: ChainContext + ?Sized>(&mut self, ctx: &C, msg: ProofMsg) -> Result<StoredInvoice, EngineError> {
        let address = msg.from_address;
        let header = &msg.session_header;

        if self.invoices().contains(&address, header) {
            return Err(EngineError::AlreadySettled);
        }
        let claim = self
            .claims()
            .get(&address, header)?
            .ok_or(EngineError::ClaimNotFound)?;

        let params = ctx.params_at(claim.session_block_height);
        if !params.is_mature(claim.session_block_height, ctx.block_height()) {
            return Err(EngineError::ClaimNotMature {
                mature_at: params.audit_height(claim.session_block_height),
            });
        }

        self.verifier_for(ctx, header)?
            .verify(&claim, &msg.merkle_proof, &msg.leaf, &msg.cousin)?;

        let invoice = StoredInvoice {
            servicer_address: claim.from_address,
            session_header: claim.session_header,
            total_relays: claim.total_relays,
            proofs: vec![msg.merkle_proof],
        };

        // Encode before touching the store so a failure leaves the claim pending.
        let bytes = marshal("invoice", &invoice)?;
        self.store
            .set(invoice_key(&invoice.servicer_address, &invoice.session_header), bytes);
        self.store
            .delete(&claim_key(&invoice.servicer_address, &invoice.session_header));

        debug!(
            "Settled {} relays for {} in session {}",
            invoice.total_relays,
            invoice.servicer_address,
            to_hex(&invoice.session_header.hash())
        );
        Ok(invoice)
    }
}

/// Selector in force for `header` and the hash recorded in its audit block.
fn audit_seed<C: ChainContext + ?Sized>(
    ctx: &C,
    header: &SessionHeader,
) -> Result<(AuditIndexSelector, Hash), EngineError> {
    let selector = AuditIndexSelector::from(&ctx.params_at(header.session_block_height));
    let height = selector.audit_height(header);
    let block_hash = ctx
        .last_block_hash(height)
        .ok_or(EngineError::AuditBlockUnavailable { height })?;
    Ok((selector, block_hash))
}
