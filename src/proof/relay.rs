//! Relay Proofs and Tokens
//!
//! A relay proof is one unit of servicer work. It carries the application
//! authentication token that authorised the client and the client's
//! signature over the proof digest.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::hash::{AuditHasher, Hash, to_hex};
use crate::core::types::{BlockHeight, SessionHeader};

/// Token versions this engine accepts.
pub const SUPPORTED_TOKEN_VERSIONS: &[&str] = &["0.0.1"];

/// Current token version.
pub const TOKEN_VERSION: &str = "0.0.1";

/// Ed25519 public key length in bytes.
const PUBLIC_KEY_LEN: usize = 32;

/// Signature verification errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Public key is not a valid ed25519 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature bytes are malformed.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// Signed message is not valid hex.
    #[error("invalid message encoding: {0}")]
    InvalidMessageEncoding(String),

    /// Signature does not match key and message.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Token validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Version not in [`SUPPORTED_TOKEN_VERSIONS`].
    #[error("unsupported token version {0:?}")]
    UnsupportedVersion(String),

    /// A public key field is not a 32-byte hex key.
    #[error("invalid {field}: {reason}")]
    InvalidPublicKey {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Application signature missing.
    #[error("missing application signature")]
    MissingApplicationSignature,

    /// Application signature does not verify.
    #[error("invalid application signature: {0}")]
    InvalidApplicationSignature(#[source] SignatureError),
}

/// Verify a hex signature over a hex-encoded message.
///
/// The message is decoded before verification, so callers pass digests
/// in their `hash_string` form.
pub fn verify_signature(
    public_key_hex: &str,
    message_hex: &str,
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let key = decode_public_key(public_key_hex).map_err(SignatureError::InvalidPublicKey)?;

    let message = hex::decode(message_hex)
        .map_err(|e| SignatureError::InvalidMessageEncoding(e.to_string()))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| SignatureError::InvalidSignatureEncoding(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| SignatureError::InvalidSignatureEncoding(e.to_string()))?;

    key.verify(&message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Sign a digest, returning the hex signature [`verify_signature`] expects.
pub fn sign_digest(key: &SigningKey, digest: &Hash) -> String {
    hex::encode(key.sign(digest).to_bytes())
}

/// Hex encoding of a signing key's public half.
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_bytes())
}

fn decode_public_key(public_key_hex: &str) -> Result<VerifyingKey, String> {
    let bytes = hex::decode(public_key_hex).map_err(|e| e.to_string())?;
    let bytes: [u8; PUBLIC_KEY_LEN] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected {} bytes, got {}", PUBLIC_KEY_LEN, bytes.len()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| e.to_string())
}

/// Application authentication token.
///
/// Issued by an application to a client; authorises the client key to
/// consume the application's relay allowance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token format version.
    pub version: String,

    /// Hex public key of the issuing application.
    pub application_public_key: String,

    /// Hex public key of the authorised client.
    pub client_public_key: String,

    /// Application signature over [`Token::hash`].
    pub application_signature: String,
}

impl Token {
    /// Issue a token for `client_public_key`, signed by the application.
    pub fn issue(application_key: &SigningKey, client_public_key: impl Into<String>) -> Self {
        let mut token = Self {
            version: TOKEN_VERSION.to_string(),
            application_public_key: public_key_hex(application_key),
            client_public_key: client_public_key.into(),
            application_signature: String::new(),
        };
        token.application_signature = sign_digest(application_key, &token.hash());
        token
    }

    /// Digest of the token, excluding the signature.
    pub fn hash(&self) -> Hash {
        let mut hasher = AuditHasher::for_token();
        hasher.update_str(&self.version);
        hasher.update_str(&self.application_public_key);
        hasher.update_str(&self.client_public_key);
        hasher.finalize()
    }

    /// Hex rendering of [`Token::hash`].
    pub fn hash_string(&self) -> String {
        to_hex(&self.hash())
    }

    /// Structural and signature checks.
    pub fn validate(&self) -> Result<(), TokenError> {
        if !SUPPORTED_TOKEN_VERSIONS.contains(&self.version.as_str()) {
            return Err(TokenError::UnsupportedVersion(self.version.clone()));
        }

        decode_public_key(&self.application_public_key).map_err(|reason| {
            TokenError::InvalidPublicKey { field: "application_public_key", reason }
        })?;
        decode_public_key(&self.client_public_key).map_err(|reason| {
            TokenError::InvalidPublicKey { field: "client_public_key", reason }
        })?;

        if self.application_signature.is_empty() {
            return Err(TokenError::MissingApplicationSignature);
        }

        verify_signature(
            &self.application_public_key,
            &self.hash_string(),
            &self.application_signature,
        )
        .map_err(TokenError::InvalidApplicationSignature)
    }
}

/// One unit of relay work, as cached by the servicer and revealed on audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProof {
    /// Client-chosen nonce, unique per relay.
    pub entropy: u64,

    /// Height of the session the relay was served in.
    pub session_block_height: BlockHeight,

    /// Hex public key of the servicer that served the relay.
    pub servicer_public_key: String,

    /// Relayed chain identifier.
    pub blockchain: String,

    /// Application token authorising the client.
    pub token: Token,

    /// Client signature over [`RelayProof::hash`].
    pub signature: String,
}

impl RelayProof {
    /// Create an unsigned relay proof.
    pub fn new(
        entropy: u64,
        session_block_height: BlockHeight,
        servicer_public_key: impl Into<String>,
        blockchain: impl Into<String>,
        token: Token,
    ) -> Self {
        Self {
            entropy,
            session_block_height,
            servicer_public_key: servicer_public_key.into(),
            blockchain: blockchain.into(),
            token,
            signature: String::new(),
        }
    }

    /// Sign with the client key named in the token.
    pub fn signed(mut self, client_key: &SigningKey) -> Self {
        self.signature = sign_digest(client_key, &self.hash());
        self
    }

    /// Session this relay belongs to.
    pub fn session_header(&self) -> SessionHeader {
        SessionHeader::new(
            self.token.application_public_key.clone(),
            self.blockchain.clone(),
            self.session_block_height,
        )
    }

    /// Digest of the proof, excluding the client signature.
    pub fn hash(&self) -> Hash {
        let mut hasher = AuditHasher::for_relay_proof();
        hasher.update_u64(self.entropy);
        hasher.update_u64(self.session_block_height);
        hasher.update_str(&self.servicer_public_key);
        hasher.update_str(&self.blockchain);
        hasher.update_bytes(&self.token.hash());
        hasher.finalize()
    }

    /// Hex rendering of [`RelayProof::hash`].
    pub fn hash_string(&self) -> String {
        to_hex(&self.hash())
    }
}
