//! On-chain vault registry and settlement ledger abstraction.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VaultResult;

/// The registry's record for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Location of the committed manifest in content storage.
    pub manifest_location: String,
    /// Vault owner.
    pub owner: Address,
    /// Registered vault name.
    pub name: String,
}

/// Handle for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle(
    /// The transaction hash.
    pub B256,
);

/// Terminal receipt for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// The transaction the receipt belongs to.
    pub tx: B256,
    /// Whether the transaction executed successfully.
    pub success: bool,
}

/// Result of registering a new vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredVault {
    /// The registration transaction.
    pub tx: B256,
    /// Derived vault identifier.
    pub vault_id: B256,
}

/// A signed transfer authorization settled against a commitment.
///
/// Mirrors EIP-3009 `transferWithAuthorization` parameters plus the
/// commitment the settlement ledger records the payment under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    /// Commitment the payment is credited against.
    pub commitment: B256,
    /// Paying wallet.
    pub from: Address,
    /// Receiving wallet.
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// Authorization validity window start (unix seconds).
    pub valid_after: u64,
    /// Authorization validity window end (unix seconds).
    pub valid_before: u64,
    /// Random authorization nonce.
    pub nonce: B256,
    /// Signature recovery id.
    pub v: u8,
    /// Signature r component.
    pub r: B256,
    /// Signature s component.
    pub s: B256,
}

/// Client for the vault registry contract and its settlement ledger.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetches the registry record for a vault.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::NotFound`] for unregistered vaults and
    /// [`crate::VaultError::Upstream`] for transport failures.
    async fn get_vault(&self, vault_id: B256) -> VaultResult<VaultRecord>;

    /// Points a vault's record at a new manifest location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when submission fails.
    async fn update_vault(&self, vault_id: B256, manifest_location: &str)
        -> VaultResult<TxHandle>;

    /// Registers a new vault for `owner` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when submission fails.
    async fn register_data_source(&self, name: &str, owner: Address)
        -> VaultResult<RegisteredVault>;

    /// Settles a signed payment against its commitment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when submission fails.
    async fn pay(&self, authorization: PaymentAuthorization) -> VaultResult<TxHandle>;

    /// Reads the total amount settled by `user` against `commitment`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] for transport failures.
    async fn check_settlement(&self, commitment: B256, user: Address) -> VaultResult<U256>;

    /// Waits for a submitted transaction to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Upstream`] when the transaction cannot be
    /// tracked.
    async fn wait_for_transaction(&self, tx: TxHandle) -> VaultResult<TxReceipt>;
}
