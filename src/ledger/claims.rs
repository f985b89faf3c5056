//! Claim Ledger
//!
//! Pending commitments: one record per servicer per session, created by a
//! claim transaction and destroyed either by settlement or by the
//! per-block expiration sweep.

use std::ops::{Deref, DerefMut};

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::config::{AuditParams, ParamsSource};
use crate::core::hash::{Hash, to_hex};
use crate::core::types::{Address, BlockHeight, SessionHeader};
use crate::error::FatalError;
use super::codec::{marshal, unmarshal};
use super::keys::{claim_key, claims_key, CLAIM_PREFIX};
use super::store::KvStore;

const RECORD: &str = "claim";

/// A servicer's commitment to a session of relay work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Servicer that submitted the claim.
    pub from_address: Address,

    /// Session the work was done in.
    pub session_header: SessionHeader,

    /// Number of relays committed to (at least one).
    pub total_relays: u64,

    /// Root over exactly `total_relays` relay proofs.
    pub merkle_root: Hash,

    /// Copy of `session_header.session_block_height`.
    pub session_block_height: BlockHeight,
}

impl ClaimRecord {
    /// Create a claim.
    pub fn new(
        from_address: Address,
        session_header: SessionHeader,
        total_relays: u64,
        merkle_root: Hash,
    ) -> Self {
        let session_block_height = session_header.session_block_height;
        Self {
            from_address,
            session_header,
            total_relays,
            merkle_root,
            session_block_height,
        }
    }
}

/// Claims stored under [`CLAIM_PREFIX`].
///
/// Borrows its store: `ClaimLedger<&S>` reads, `ClaimLedger<&mut S>` also writes.
pub struct ClaimLedger<St> {
    store: St,
}

impl<St> ClaimLedger<St>
where
    St: Deref,
    St::Target: KvStore,
{
    /// Wrap a store handle.
    pub fn new(store: St) -> Self {
        Self { store }
    }

    /// Maturity rule: the waiting period has passed since the session began.
    pub fn is_mature(header: &SessionHeader, current_height: BlockHeight, params: &AuditParams) -> bool {
        params.is_mature(header.session_block_height, current_height)
    }

    /// Claim of `address` for `header`.
    pub fn get(&self, address: &Address, header: &SessionHeader) -> Result<Option<ClaimRecord>, FatalError> {
        let key = claim_key(address, header);
        self.store
            .get(&key)
            .map(|bytes| unmarshal(RECORD, &key, &bytes))
            .transpose()
    }

    /// All claims of `address`, in session-hash order.
    pub fn list_by_address(&self, address: &Address) -> Result<Vec<ClaimRecord>, FatalError> {
        self.scan(&claims_key(address))
    }

    /// Every claim, in address-major order.
    pub fn list_all(&self) -> Result<Vec<ClaimRecord>, FatalError> {
        self.scan(CLAIM_PREFIX)
    }

    /// Claims of `address` whose proofs may be submitted at `current_height`.
    ///
    /// Params are read at each claim's session height.
    pub fn list_mature_by_address<P: ParamsSource + ?Sized>(
        &self,
        address: &Address,
        current_height: BlockHeight,
        params: &P,
    ) -> Result<Vec<ClaimRecord>, FatalError> {
        let mut claims = self.list_by_address(address)?;
        claims.retain(|claim| {
            let p = params.params_at(claim.session_block_height);
            Self::is_mature(&claim.session_header, current_height, &p)
        });
        Ok(claims)
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<ClaimRecord>, FatalError> {
        self.store
            .iter_prefix(prefix)
            .into_iter()
            .map(|(key, bytes)| unmarshal(RECORD, &key, &bytes))
            .collect()
    }
}

impl<St> ClaimLedger<St>
where
    St: DerefMut,
    St::Target: KvStore,
{
    /// Store a claim, replacing any claim for the same servicer and session.
    pub fn put(&mut self, claim: &ClaimRecord) -> Result<(), FatalError> {
        let bytes = marshal(RECORD, claim)?;
        self.store
            .set(claim_key(&claim.from_address, &claim.session_header), bytes);
        Ok(())
    }

    /// Store many claims (genesis import).
    pub fn put_many(&mut self, claims: &[ClaimRecord]) -> Result<(), FatalError> {
        // Encode everything first so a bad record leaves the store untouched.
        let encoded = claims
            .iter()
            .map(|claim| {
                marshal(RECORD, claim)
                    .map(|bytes| (claim_key(&claim.from_address, &claim.session_header), bytes))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (key, bytes) in encoded {
            self.store.set(key, bytes);
        }
        Ok(())
    }

    /// Remove the claim of `address` for `header`.
    pub fn delete(&mut self, address: &Address, header: &SessionHeader) {
        self.store.delete(&claim_key(address, header));
    }

    /// Delete every claim that has outlived the expiration window.
    ///
    /// Params are read at each claim's session height. Returns the
    /// removed claims in key order.
    pub fn sweep_expired<P: ParamsSource + ?Sized>(
        &mut self,
        current_height: BlockHeight,
        params: &P,
    ) -> Result<Vec<ClaimRecord>, FatalError> {
        let mut removed = Vec::new();

        for (key, bytes) in self.store.iter_prefix(CLAIM_PREFIX) {
            let claim: ClaimRecord = unmarshal(RECORD, &key, &bytes)?;
            let p = params.params_at(claim.session_block_height);

            if p.is_expired(claim.session_block_height, current_height) {
                debug!(
                    "Claim {} of {} for session at {} expired at height {}",
                    to_hex(&claim.session_header.hash()),
                    claim.from_address,
                    claim.session_block_height,
                    current_height
                );
                self.store.delete(&key);
                removed.push(claim);
            }
        }

        Ok(removed)
    }
}
