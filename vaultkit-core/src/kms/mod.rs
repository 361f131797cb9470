//! Key-management providers: the wrapping/unwrapping boundary of the vault.
//!
//! A provider wraps ephemeral keys under access conditions and later releases
//! them only after the condition's verifier approves the caller. Two
//! implementations ship here: a remote HTTP adapter for a hosted custodian
//! network, and a local sandbox that evaluates policies in-process.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VaultResult;
use crate::predicate::AccessCondition;
use crate::types::WrappedKey;

mod remote;
pub mod sandbox;

pub use remote::RemoteKmsProvider;
pub use sandbox::{SandboxConfig, SandboxExecutor};

/// A wallet-derived proof of caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSignature {
    /// Signature bytes, hex encoded.
    pub sig: String,
    /// Signing scheme identifier (e.g. `"web3.eth.personal.sign"`).
    pub derived_via: String,
    /// The exact message that was signed.
    pub signed_message: String,
}

/// The caller identity asserted for a decrypt invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Caller wallet address.
    pub address: Address,
    /// Optional signature backing the assertion. The sandbox trusts the bare
    /// address; remote custodians verify the signature themselves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<AuthSignature>,
}

impl AuthContext {
    /// Asserts an address without signature backing.
    #[must_use]
    pub const fn unsigned(address: Address) -> Self {
        Self {
            address,
            signature: None,
        }
    }
}

/// How a decrypt invocation names its verifier program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifierRef {
    /// Program source carried inline with the request.
    Inline {
        /// Canonical program source text.
        source: String,
    },
    /// Content-addressed reference to a published program.
    Reference {
        /// The published reference.
        reference: String,
    },
}

/// A request to release a wrapped key (and optionally the protected data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptRequest {
    /// Wrapped-key ciphertext, base64.
    pub ciphertext: String,
    /// Content hash the wrapped key is addressed by.
    pub content_hash: String,
    /// Verifier program gating the release, when the condition names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<VerifierRef>,
    /// Named parameters bound to the program invocation.
    pub params: Map<String, Value>,
    /// Asserted caller identity.
    pub auth_context: AuthContext,
}

/// Outcome of a decrypt invocation.
///
/// Policy denials and execution faults are carried here as values; the
/// provider boundary never converts them into errors. `error` is set exactly
/// when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptOutcome {
    /// Whether the policy approved the release.
    pub success: bool,
    /// Released key material (or program-produced payload) on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// Denial reason or normalized execution fault on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution log emitted by the verifier program.
    #[serde(default)]
    pub logs: Vec<String>,
}

impl DecryptOutcome {
    /// Builds a successful outcome carrying released data.
    #[must_use]
    pub fn approved(data: Vec<u8>, logs: Vec<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            logs,
        }
    }

    /// Builds a failed outcome carrying a reason.
    #[must_use]
    pub fn denied(error: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            logs,
        }
    }
}

/// The wrapping/unwrapping provider boundary.
#[async_trait]
pub trait KeyManagementProvider: Send + Sync {
    /// Establishes the provider connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when the provider is
    /// unreachable; the provider is then unusable until reconstructed.
    async fn connect(&self) -> VaultResult<()>;

    /// Tears down the connection and discards provider-held state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] on transport failures.
    async fn disconnect(&self) -> VaultResult<()>;

    /// Reports whether the provider is currently connected.
    async fn is_connected(&self) -> bool;

    /// Wraps key material under an access condition.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Configuration`] when not connected and
    /// [`crate::VaultError::Upstream`] on provider failures.
    async fn encrypt(
        &self,
        key_material: &[u8],
        condition: &AccessCondition,
    ) -> VaultResult<WrappedKey>;

    /// Evaluates the request's policy and releases the key when approved.
    ///
    /// Denials and execution faults come back inside the outcome; this
    /// method does not error on them.
    async fn decrypt(&self, request: DecryptRequest) -> DecryptOutcome;

    /// Publishes verifier program source and returns its stable reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when publication fails.
    async fn upload_action(&self, source: &str) -> VaultResult<String>;
}

/// Provider selection.
#[derive(Debug, Clone)]
pub enum KmsConfig {
    /// Hosted custodian network reached over HTTP.
    Remote {
        /// Base endpoint, e.g. `https://kms.example.com`.
        endpoint: String,
    },
    /// In-process sandbox evaluator.
    Sandbox(SandboxConfig),
}

/// Constructs a provider from its configuration.
#[must_use]
pub fn create_provider(config: KmsConfig) -> Arc<dyn KeyManagementProvider> {
    match config {
        KmsConfig::Remote { endpoint } => Arc::new(RemoteKmsProvider::new(endpoint)),
        KmsConfig::Sandbox(config) => Arc::new(SandboxExecutor::new(config)),
    }
}
