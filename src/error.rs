//! Fatal Errors
//!
//! Failures that indicate corrupted or unencodable consensus state.
//! Recoverable validation failures live next to the code that raises them.

use thiserror::Error;

/// Unrecoverable failure on the consensus path.
///
/// Callers at the top of block execution must halt processing rather
/// than continue with partially applied state.
#[derive(Debug, Error)]
pub enum FatalError {
    /// A record could not be encoded.
    #[error("failed to encode {what}: {reason}")]
    Encode {
        /// Record kind.
        what: &'static str,
        /// Underlying codec error.
        reason: String,
    },

    /// Stored bytes could not be decoded.
    #[error("failed to decode {what} at key {key}: {reason}")]
    Decode {
        /// Record kind.
        what: &'static str,
        /// Hex-encoded store key.
        key: String,
        /// Underlying codec error.
        reason: String,
    },

    /// The audit digest was not the expected hex prefix.
    #[error("malformed audit digest {0:?}")]
    MalformedDigest(String),
}
