//! Error types shared across the vault protocol.

use thiserror::Error;

/// Result type alias for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by vault sessions, predicate compilation and key-management
/// providers.
///
/// Policy *denials* are deliberately not represented here as a thrown error
/// on the provider boundary: [`crate::kms::DecryptOutcome`] carries them as a
/// value and only [`crate::session::VaultSession::decrypt_file`] converts a
/// denial into [`VaultError::AccessDenied`] for its own callers.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The session is missing required configuration (e.g. no signing
    /// identity bound).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A vault, manifest or entry could not be located.
    #[error("not found: {0}")]
    NotFound(String),

    /// A staging/commit precondition was violated.
    #[error("staging error: {0}")]
    Staging(String),

    /// A policy evaluation rejected the caller. Structured and expected;
    /// callers should branch on it, not treat it as a fault.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The sandboxed policy engine could not run the verifier program
    /// (malformed output, unknown content hash, unresolvable action
    /// reference). Never exposes key material.
    #[error("sandbox execution error: {0}")]
    SandboxExecution(String),

    /// Authenticated decryption failed (tampered ciphertext, wrong key).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Cryptographic failure outside of tag verification.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage, registry or RPC failure. Transient; callers may retry.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}
