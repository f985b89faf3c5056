//! Submission Scheduler
//!
//! Drives one servicer through the audit lifecycle as blocks arrive.
//!
//! ```text
//!   new block
//!      │
//!      ├─► claim pass: ended sessions in the cache ──► ClaimSubmitter
//!      │
//!      └─► proof pass: mature claims in the ledger ──► ProofSubmitter
//!                        (settled ones are cleaned up)
//! ```
//!
//! The scheduler reads the latest committed store and writes only the work
//! cache and outgoing transactions, plus removal of claims that are already
//! settled. Any collaborator failure aborts the pass; the next block retries.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ParamsSource;
use crate::core::chain::ChainContext;
use crate::core::hash::to_hex;
use crate::core::types::Address;
use crate::error::FatalError;
use crate::keeper::{AuditKeeper, EngineError};
use crate::ledger::store::KvStore;
use crate::tx::{ClaimMsg, ProofMsg};
use super::cache::WorkCache;
use super::submit::{ClaimSubmitter, ProofSubmitter, SubmitError};

/// Why a pass was aborted.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Broadcast failed.
    #[error("submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// Engine query failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Store is corrupt.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Outcome of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Transactions broadcast.
    pub submitted: usize,
    /// Entries left for a later block.
    pub skipped: usize,
    /// Cache entries dropped as unbillable.
    pub discarded: usize,
    /// Already-settled claims cleaned up.
    pub reclaimed: usize,
}

/// Outcome of one block's passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Claim pass.
    pub claims: PassReport,
    /// Proof pass.
    pub proofs: PassReport,
}

/// Claim and proof automation for one servicer.
pub struct SubmissionScheduler {
    address: Address,
    cache: Arc<WorkCache>,
    claims: Arc<dyn ClaimSubmitter>,
    proofs: Arc<dyn ProofSubmitter>,
}

impl SubmissionScheduler {
    /// Create a scheduler acting for `address`.
    pub fn new(
        address: Address,
        cache: Arc<WorkCache>,
        claims: Arc<dyn ClaimSubmitter>,
        proofs: Arc<dyn ProofSubmitter>,
    ) -> Self {
        Self {
            address,
            cache,
            claims,
            proofs,
        }
    }

    /// Servicer this scheduler acts for.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Run the claim pass then the proof pass for the current block.
    pub async fn run_cycle<S, C>(&self, keeper: &mut AuditKeeper<S>, ctx: &C) -> Result<CycleReport, SchedulerError>
    where
        S: KvStore,
        C: ChainContext + ?Sized,
    {
        let claims = self.run_claim_pass(keeper, ctx).await?;
        let proofs = self.run_proof_pass(keeper, ctx).await?;
        Ok(CycleReport { claims, proofs })
    }

    /// Submit claims for every cached session that has ended.
    #[instrument(skip_all, fields(height = ctx.block_height()))]
    pub async fn run_claim_pass<S, C>(&self, keeper: &AuditKeeper<S>, ctx: &C) -> Result<PassReport, SchedulerError>
    where
        S: KvStore,
        C: ChainContext + ?Sized,
    {
        let height = ctx.block_height();
        let mut report = PassReport::default();

        for header in self.cache.headers().await {
            let Some(work) = self.cache.session(&header).await else {
                continue;
            };
            let total_relays = work.lock().await.total_relays();
            if total_relays == 0 {
                continue;
            }

            let session_height = header.session_block_height;
            if !ctx.is_supported_chain(session_height, &header.chain) {
                warn!(
                    "Discarding {} relays for unsupported chain {} (session {})",
                    total_relays, header.chain, session_height
                );
                self.cache.remove(&header).await;
                report.discarded += 1;
                continue;
            }

            let params = ctx.params_at(session_height);
            if height < params.session_end_height(session_height) {
                report.skipped += 1;
                continue;
            }
            if params.is_expired(session_height, height) {
                warn!("Discarding session {} past its claim window", session_height);
                self.cache.remove(&header).await;
                report.discarded += 1;
                continue;
            }

            if keeper.claims().get(&self.address, &header)?.is_some()
                || keeper.invoices().contains(&self.address, &header)
            {
                report.skipped += 1;
                continue;
            }

            // Commit to exactly the relays counted above, even if more arrived since.
            let Some(merkle_root) = work.lock().await.prefix_root(total_relays) else {
                continue;
            };

            let response = self
                .claims
                .submit_claim(ClaimMsg {
                    from_address: self.address,
                    session_header: header.clone(),
                    total_relays,
                    merkle_root,
                })
                .await?;

            info!(
                "Claim submitted for session {} ({} relays), tx {}",
                session_height, total_relays, response.tx_hash
            );
            report.submitted += 1;
        }

        Ok(report)
    }

    /// Submit proofs for every mature claim of this servicer.
    #[instrument(skip_all, fields(height = ctx.block_height()))]
    pub async fn run_proof_pass<S, C>(&self, keeper: &mut AuditKeeper<S>, ctx: &C) -> Result<PassReport, SchedulerError>
    where
        S: KvStore,
        C: ChainContext + ?Sized,
    {
        let height = ctx.block_height();
        let mut report = PassReport::default();

        let mature = keeper.claims().list_mature_by_address(&self.address, height, ctx)?;
        for claim in mature {
            let header = &claim.session_header;

            if keeper.invoices().contains(&self.address, header) {
                debug!("Session {} already settled, cleaning up", to_hex(&header.hash()));
                self.cache.remove(header).await;
                keeper.claims_mut().delete(&self.address, header);
                report.reclaimed += 1;
                continue;
            }

            let index = match keeper.audit_index(ctx, header, claim.total_relays) {
                Ok(index) => index,
                Err(EngineError::AuditBlockUnavailable { height: audit_height }) => {
                    debug!("Audit block {} not yet available", audit_height);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let Some(work) = self.cache.session(header).await else {
                warn!(
                    "No cached relays for claimed session {}, cannot prove",
                    claim.session_block_height
                );
                report.skipped += 1;
                continue;
            };

            // Relays served after the claim sit past its prefix and are ignored.
            let reveal = {
                let work = work.lock().await;
                if work.total_relays() < claim.total_relays {
                    warn!(
                        "Cache holds {} relays but claim committed {}, cannot prove",
                        work.total_relays(),
                        claim.total_relays
                    );
                    report.skipped += 1;
                    continue;
                }
                work.reveal_prefix(claim.total_relays, index)
            };
            let Some(reveal) = reveal else {
                warn!(
                    "Audit index {} has no leaf in session {} ({} relays)",
                    index, claim.session_block_height, claim.total_relays
                );
                report.skipped += 1;
                continue;
            };

            let response = self
                .proofs
                .submit_proof(ProofMsg {
                    from_address: self.address,
                    session_header: header.clone(),
                    merkle_proof: reveal.proof,
                    leaf: reveal.leaf,
                    cousin: reveal.cousin,
                })
                .await?;

            info!(
                "Proof submitted for session {} at index {}, tx {}",
                claim.session_block_height, index, response.tx_hash
            );
            report.submitted += 1;
        }

        Ok(report)
    }
}
