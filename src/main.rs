//! Relay Audit Node
//!
//! Runs one servicer against a simulated chain through the whole audit
//! lifecycle: relays are served, claimed once the session ends, proven
//! once the audit block exists, and settled into invoices.

use std::sync::Arc;
use ed25519_dalek::SigningKey;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_audit::{
    VERSION,
    config::{NodeConfig, ParamsSource},
    core::{hash::hash_bytes, types::Address, ChainContext, SimulatedChain},
    keeper::AuditKeeper,
    ledger::MemStore,
    proof::relay::{public_key_hex, RelayProof, Token},
    servicer::{ChannelSubmitter, SchedulerError, SubmissionScheduler, Transaction, WorkCache},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::from_env()?;

    info!("Relay Audit Node v{}", VERSION);
    info!(
        "Waiting period: {} sessions, session length: {} blocks, claim expiration: {} sessions",
        config.params.waiting_period_sessions,
        config.params.session_frequency_blocks,
        config.params.claim_expiration_sessions
    );
    info!("Supported chains: {}", config.supported_chains.join(", "));

    run_demo(&config).await
}

/// Simulate one servicer for `config.demo_blocks` blocks.
async fn run_demo(config: &NodeConfig) -> anyhow::Result<()> {
    info!("=== Starting Demo ===");

    let mut chain = SimulatedChain::new(hash_bytes(b"relay-audit-demo"), config.params)?
        .with_supported_chains(config.supported_chains.iter().cloned());

    let servicer_key = SigningKey::from_bytes(&[0x11; 32]);
    let app_key = SigningKey::from_bytes(&[0x22; 32]);
    let client_key = SigningKey::from_bytes(&[0x33; 32]);

    let address = Address::from_public_key(&servicer_key.verifying_key().to_bytes());
    let servicer_pk = public_key_hex(&servicer_key);
    let token = Token::issue(&app_key, public_key_hex(&client_key));
    info!("Servicer address: {}", address);

    let cache = Arc::new(WorkCache::new());
    let (submitter, mut mempool) = ChannelSubmitter::new();
    let submitter = Arc::new(submitter);
    let scheduler = SubmissionScheduler::new(address, Arc::clone(&cache), submitter.clone(), submitter);
    let mut keeper = AuditKeeper::new(MemStore::new());

    let mut entropy = 0u64;
    let mut sessions = 0usize;

    for _ in 0..config.demo_blocks {
        let height = chain.advance();
        keeper.on_begin_block(&chain)?;

        // Include whatever the scheduler broadcast last block.
        while let Ok(tx) = mempool.try_recv() {
            let result = match tx {
                Transaction::Claim(msg) => keeper.handle_claim(&chain, msg),
                Transaction::Proof(msg) => keeper.handle_proof(&chain, msg).map(|invoice| {
                    info!(
                        "Height {}: settled {} relays for session {}",
                        height, invoice.total_relays, invoice.session_header.session_block_height
                    );
                }),
            };
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Halting at height {}: {}", height, e);
                    return Err(e.into());
                }
                Err(e) => warn!("Height {}: transaction rejected: {}", height, e),
            }
        }

        // A new session opens every `session_frequency_blocks` blocks.
        let frequency = chain.params_at(height).session_frequency_blocks;
        if height % frequency == 0 && !config.supported_chains.is_empty() {
            let relay_chain = &config.supported_chains[sessions % config.supported_chains.len()];
            for _ in 0..config.relays_per_session {
                let relay = RelayProof::new(entropy, height, servicer_pk.clone(), relay_chain.clone(), token.clone())
                    .signed(&client_key);
                cache.add_relay(relay).await;
                entropy += 1;
            }
            sessions += 1;
            info!(
                "Height {}: served {} relays on chain {}",
                height, config.relays_per_session, relay_chain
            );
        }

        match scheduler.run_cycle(&mut keeper, &chain).await {
            Ok(report) => debug!("Height {}: {:?}", chain.block_height(), report),
            Err(SchedulerError::Submit(e)) => warn!("Height {}: submission failed: {}", height, e),
            Err(e) => return Err(e.into()),
        }

        tokio::time::sleep(config.block_interval).await;
    }

    let invoices = keeper.invoices().list_by_address(&address)?;
    let pending = keeper.claims().list_by_address(&address)?;
    let billed: u64 = invoices.iter().map(|i| i.total_relays).sum();

    info!("=== Demo Complete ===");
    info!("Sessions served: {}", sessions);
    info!("Invoices: {} ({} relays billed)", invoices.len(), billed);
    info!("Pending claims: {}", pending.len());
    info!("Cached sessions: {}", cache.len().await);

    Ok(())
}
