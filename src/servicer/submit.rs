//! Transaction Submission
//!
//! The scheduler never builds or broadcasts transactions itself; it hands
//! messages to these collaborators.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::hash::{hash_bytes, to_hex};
use crate::tx::{ClaimMsg, ProofMsg};

/// Broadcast acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResponse {
    /// Hex transaction hash.
    pub tx_hash: String,
    /// Zero on acceptance into the mempool.
    pub code: u32,
    /// Node log line.
    pub raw_log: String,
}

/// Failure to get a transaction broadcast.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Node refused the transaction.
    #[error("transaction rejected (code {code}): {log}")]
    Rejected {
        /// Node result code.
        code: u32,
        /// Node log line.
        log: String,
    },

    /// Node unreachable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Message could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Sends claim transactions.
#[async_trait]
pub trait ClaimSubmitter: Send + Sync {
    /// Broadcast a claim.
    async fn submit_claim(&self, msg: ClaimMsg) -> Result<TxResponse, SubmitError>;
}

/// Sends proof transactions.
#[async_trait]
pub trait ProofSubmitter: Send + Sync {
    /// Broadcast a proof.
    async fn submit_proof(&self, msg: ProofMsg) -> Result<TxResponse, SubmitError>;
}

/// A transaction waiting for inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    /// Claim commitment.
    Claim(ClaimMsg),
    /// Proof reveal.
    Proof(ProofMsg),
}

/// Submitter that queues transactions on a channel, standing in for a mempool.
#[derive(Clone, Debug)]
pub struct ChannelSubmitter {
    tx: mpsc::UnboundedSender<Transaction>,
}

impl ChannelSubmitter {
    /// Create a submitter and the receiving end of its queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Transaction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn enqueue(&self, what: &str, bytes: Vec<u8>, transaction: Transaction) -> Result<TxResponse, SubmitError> {
        let tx_hash = to_hex(&hash_bytes(&bytes));
        self.tx
            .send(transaction)
            .map_err(|_| SubmitError::Transport("mempool closed".into()))?;
        Ok(TxResponse {
            tx_hash,
            code: 0,
            raw_log: format!("{} queued", what),
        })
    }
}

#[async_trait]
impl ClaimSubmitter for ChannelSubmitter {
    async fn submit_claim(&self, msg: ClaimMsg) -> Result<TxResponse, SubmitError> {
        let bytes = bincode::serialize(&msg).map_err(|e| SubmitError::Encoding(e.to_string()))?;
        self.enqueue("claim", bytes, Transaction::Claim(msg))
    }
}

#[async_trait]
impl ProofSubmitter for ChannelSubmitter {
    async fn submit_proof(&self, msg: ProofMsg) -> Result<TxResponse, SubmitError> {
        let bytes = bincode::serialize(&msg).map_err(|e| SubmitError::Encoding(e.to_string()))?;
        self.enqueue("proof", bytes, Transaction::Proof(msg))
    }
}
