//! Chain Context
//!
//! Read-only view of the chain the engine executes against: the current
//! height, block hashes, governance params and the supported-chain oracle.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{AuditParams, ConfigError, ParamsSchedule, ParamsSource};
use super::hash::{Hash, hash_with_domain};
use super::types::BlockHeight;

/// Domain separator for simulated block hashes.
const BLOCK_HASH_DOMAIN: &[u8] = b"RELAY_AUDIT_BLOCK_V1";

/// Chain state visible to the engine at one height.
pub trait ChainContext: ParamsSource {
    /// Height of the block being executed (or latest committed, off-chain).
    fn block_height(&self) -> BlockHeight;

    /// Hash of the block preceding `height`, as recorded in the header of
    /// the block at `height`. `None` if that block does not exist yet.
    fn last_block_hash(&self, height: BlockHeight) -> Option<Hash>;

    /// Whether relays for `chain` are billable at `height`.
    fn is_supported_chain(&self, height: BlockHeight, chain: &str) -> bool;
}

/// Deterministic in-process chain.
///
/// Block hashes are derived from a genesis hash and the height, so two
/// instances built from the same genesis observe identical hashes.
#[derive(Clone, Debug)]
pub struct SimulatedChain {
    height: BlockHeight,
    genesis: Hash,
    params: ParamsSchedule,
    /// Supported chain sets keyed by the height they take effect.
    supported_chains: BTreeMap<BlockHeight, BTreeSet<String>>,
}

impl SimulatedChain {
    /// Create a chain at height zero with `params` in force from genesis.
    pub fn new(genesis: Hash, params: AuditParams) -> Result<Self, ConfigError> {
        Ok(Self {
            height: 0,
            genesis,
            params: ParamsSchedule::new(params)?,
            supported_chains: BTreeMap::new(),
        })
    }

    /// Builder-style supported chains from height zero.
    pub fn with_supported_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_supported_chains(0, chains);
        self
    }

    /// Replace the supported chain set from `height` onward.
    pub fn set_supported_chains<I, S>(&mut self, height: BlockHeight, chains: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = chains.into_iter().map(Into::into).collect();
        self.supported_chains.insert(height, set);
    }

    /// Governance schedule (mutable, for param changes).
    pub fn params_mut(&mut self) -> &mut ParamsSchedule {
        &mut self.params
    }

    /// Produce the next block.
    pub fn advance(&mut self) -> BlockHeight {
        self.height += 1;
        self.height
    }

    /// Jump to `height` (never backwards).
    pub fn advance_to(&mut self, height: BlockHeight) {
        self.height = self.height.max(height);
    }

    /// Hash of the block at `height`.
    pub fn block_hash(&self, height: BlockHeight) -> Hash {
        let mut data = Vec::with_capacity(40);
        data.extend_from_slice(&self.genesis);
        data.extend_from_slice(&height.to_le_bytes());
        hash_with_domain(BLOCK_HASH_DOMAIN, &data)
    }
}

impl ParamsSource for SimulatedChain {
    fn params_at(&self, height: BlockHeight) -> AuditParams {
        self.params.at(height)
    }
}

impl ChainContext for SimulatedChain {
    fn block_height(&self) -> BlockHeight {
        self.height
    }

    fn last_block_hash(&self, height: BlockHeight) -> Option<Hash> {
        if height == 0 || height > self.height {
            return None;
        }
        Some(self.block_hash(height - 1))
    }

    fn is_supported_chain(&self, height: BlockHeight, chain: &str) -> bool {
        self.supported_chains
            .range(..=height)
            .next_back()
            .map(|(_, set)| set.contains(chain))
            .unwrap_or(false)
    }
}
