//! Protocol and Node Configuration
//!
//! - [`AuditParams`]: governance-settable lifecycle parameters
//! - [`ParamsSchedule`]: history of parameter changes by height
//! - [`NodeConfig`]: servicer process settings read from the environment

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::types::BlockHeight;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Sessions must span at least one block.
    #[error("session frequency must be at least one block")]
    ZeroSessionFrequency,

    /// Claims must live for at least one session.
    #[error("claim expiration must be at least one session")]
    ZeroClaimExpiration,

    /// A claim would expire before it can be proven.
    #[error("claim expiration ({expiration} sessions) must exceed the proof waiting period ({waiting} sessions)")]
    ExpirationBeforeMaturity {
        /// Configured expiration in sessions.
        expiration: u64,
        /// Configured waiting period in sessions.
        waiting: u64,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Lifecycle parameters of the audit protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParams {
    /// Sessions a claim must wait before its proof can be submitted.
    pub waiting_period_sessions: u64,
    /// Blocks per session.
    pub session_frequency_blocks: u64,
    /// Sessions after which an unproven claim is purged.
    pub claim_expiration_sessions: u64,
}

impl Default for AuditParams {
    fn default() -> Self {
        Self {
            waiting_period_sessions: 3,
            session_frequency_blocks: 4,
            claim_expiration_sessions: 24,
        }
    }
}

impl AuditParams {
    /// Create params.
    pub const fn new(
        waiting_period_sessions: u64,
        session_frequency_blocks: u64,
        claim_expiration_sessions: u64,
    ) -> Self {
        Self {
            waiting_period_sessions,
            session_frequency_blocks,
            claim_expiration_sessions,
        }
    }

    /// Check the params describe a usable lifecycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_frequency_blocks == 0 {
            return Err(ConfigError::ZeroSessionFrequency);
        }
        if self.claim_expiration_sessions == 0 {
            return Err(ConfigError::ZeroClaimExpiration);
        }
        if self.claim_expiration_sessions <= self.waiting_period_sessions {
            return Err(ConfigError::ExpirationBeforeMaturity {
                expiration: self.claim_expiration_sessions,
                waiting: self.waiting_period_sessions,
            });
        }
        Ok(())
    }

    /// Waiting period expressed in blocks.
    pub fn waiting_period_blocks(&self) -> u64 {
        self.waiting_period_sessions
            .saturating_mul(self.session_frequency_blocks)
    }

    /// Height whose block hash seeds the audit of a session.
    ///
    /// Also the first height at which a claim for the session is mature.
    pub fn audit_height(&self, session_block_height: BlockHeight) -> BlockHeight {
        session_block_height.saturating_add(self.waiting_period_blocks())
    }

    /// Height at which the session stops accepting relays.
    pub fn session_end_height(&self, session_block_height: BlockHeight) -> BlockHeight {
        session_block_height.saturating_add(self.session_frequency_blocks)
    }

    /// Whole sessions elapsed since `session_block_height`.
    pub fn sessions_elapsed(&self, session_block_height: BlockHeight, current_height: BlockHeight) -> u64 {
        current_height
            .saturating_sub(session_block_height)
            .checked_div(self.session_frequency_blocks)
            .unwrap_or(0)
    }

    /// Has the waiting period passed?
    pub fn is_mature(&self, session_block_height: BlockHeight, current_height: BlockHeight) -> bool {
        current_height >= self.audit_height(session_block_height)
    }

    /// Has the claim outlived the expiration window?
    pub fn is_expired(&self, session_block_height: BlockHeight, current_height: BlockHeight) -> bool {
        self.sessions_elapsed(session_block_height, current_height) >= self.claim_expiration_sessions
    }
}

/// Source of the [`AuditParams`] in force at a given height.
pub trait ParamsSource {
    /// Params in force at `height`.
    fn params_at(&self, height: BlockHeight) -> AuditParams;
}

impl ParamsSource for AuditParams {
    fn params_at(&self, _height: BlockHeight) -> AuditParams {
        *self
    }
}

/// Governance history of [`AuditParams`].
///
/// Each entry takes effect at its height and stays in force until the next.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamsSchedule {
    entries: BTreeMap<BlockHeight, AuditParams>,
}

impl ParamsSchedule {
    /// Schedule with `genesis` params in force from height zero.
    pub fn new(genesis: AuditParams) -> Result<Self, ConfigError> {
        genesis.validate()?;
        Ok(Self::starting_with(genesis))
    }

    fn starting_with(genesis: AuditParams) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(0, genesis);
        Self { entries }
    }

    /// Record a governance change effective from `height`.
    pub fn set(&mut self, height: BlockHeight, params: AuditParams) -> Result<(), ConfigError> {
        params.validate()?;
        self.entries.insert(height, params);
        Ok(())
    }

    /// Params in force at `height`.
    pub fn at(&self, height: BlockHeight) -> AuditParams {
        self.entries
            .range(..=height)
            .next_back()
            .map(|(_, params)| *params)
            .unwrap_or_default()
    }
}

impl Default for ParamsSchedule {
    fn default() -> Self {
        Self::starting_with(AuditParams::default())
    }
}

impl ParamsSource for ParamsSchedule {
    fn params_at(&self, height: BlockHeight) -> AuditParams {
        self.at(height)
    }
}

/// Servicer process configuration.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Genesis audit params for the simulated chain.
    pub params: AuditParams,
    /// Chains the servicer relays for.
    pub supported_chains: Vec<String>,
    /// Delay between observed blocks.
    pub block_interval: Duration,
    /// Number of blocks the demo runs for.
    pub demo_blocks: u64,
    /// Relays served per session by the demo.
    pub relays_per_session: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            params: AuditParams::default(),
            supported_chains: vec!["0001".to_string(), "0021".to_string()],
            block_interval: Duration::from_millis(50),
            demo_blocks: 40,
            relays_per_session: 13,
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables fall back to [`NodeConfig::default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let params = AuditParams {
            waiting_period_sessions: env_u64(
                "RELAY_AUDIT_WAITING_PERIOD",
                defaults.params.waiting_period_sessions,
            )?,
            session_frequency_blocks: env_u64(
                "RELAY_AUDIT_SESSION_FREQUENCY",
                defaults.params.session_frequency_blocks,
            )?,
            claim_expiration_sessions: env_u64(
                "RELAY_AUDIT_CLAIM_EXPIRATION",
                defaults.params.claim_expiration_sessions,
            )?,
        };
        params.validate()?;

        let supported_chains = std::env::var("RELAY_AUDIT_CHAINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.supported_chains);

        Ok(Self {
            params,
            supported_chains,
            block_interval: Duration::from_millis(env_u64(
                "RELAY_AUDIT_BLOCK_INTERVAL_MS",
                defaults.block_interval.as_millis() as u64,
            )?),
            demo_blocks: env_u64("RELAY_AUDIT_DEMO_BLOCKS", defaults.demo_blocks)?,
            relays_per_session: env_u64("RELAY_AUDIT_RELAYS_PER_SESSION", defaults.relays_per_session)?,
        })
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert_eq!(AuditParams::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_degenerate_params() {
        assert_eq!(
            AuditParams::new(2, 0, 5).validate(),
            Err(ConfigError::ZeroSessionFrequency)
        );
        assert_eq!(
            AuditParams::new(2, 10, 0).validate(),
            Err(ConfigError::ZeroClaimExpiration)
        );
        assert!(matches!(
            AuditParams::new(5, 10, 5).validate(),
            Err(ConfigError::ExpirationBeforeMaturity { .. })
        ));
    }

    #[test]
    fn test_maturity_window() {
        let params = AuditParams::new(2, 10, 5);
        assert_eq!(params.audit_height(100), 120);
        assert!(!params.is_mature(100, 119));
        assert!(params.is_mature(100, 120));
        assert!(params.is_mature(100, 500));
    }

    #[test]
    fn test_expiration_window() {
        let params = AuditParams::new(2, 10, 5);
        assert!(!params.is_expired(100, 149));
        assert!(params.is_expired(100, 150));
        // Heights before the session never count as elapsed.
        assert_eq!(params.sessions_elapsed(100, 50), 0);
    }

    #[test]
    fn test_zero_frequency_never_expires() {
        let params = AuditParams::new(0, 0, 1);
        assert_eq!(params.sessions_elapsed(0, 1_000), 0);
        assert!(!params.is_expired(0, 1_000));
    }

    #[test]
    fn test_schedule_lookup() {
        let genesis = AuditParams::new(2, 10, 5);
        let upgraded = AuditParams::new(3, 20, 8);

        let mut schedule = ParamsSchedule::new(genesis).unwrap();
        schedule.set(1_000, upgraded).unwrap();

        assert_eq!(schedule.at(0), genesis);
        assert_eq!(schedule.at(999), genesis);
        assert_eq!(schedule.at(1_000), upgraded);
        assert_eq!(schedule.params_at(5_000), upgraded);
    }

    #[test]
    fn test_schedule_rejects_invalid_params() {
        let mut schedule = ParamsSchedule::default();
        assert!(schedule.set(10, AuditParams::new(1, 0, 4)).is_err());
        assert_eq!(schedule.at(10), AuditParams::default());
    }

    #[test]
    fn test_schedule_rejects_invalid_genesis() {
        assert_eq!(
            ParamsSchedule::new(AuditParams::new(1, 0, 4)).unwrap_err(),
            ConfigError::ZeroSessionFrequency
        );
        assert!(ParamsSchedule::new(AuditParams::new(3, 4, 3)).is_err());
        assert!(ParamsSchedule::default().at(0).validate().is_ok());
    }
}
