//! Common test utilities shared across integration tests.
#![allow(dead_code)]
#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use vaultkit_core::kms::{KeyManagementProvider, KmsConfig, SandboxConfig};
use vaultkit_core::registry::{
    PaymentAuthorization, RegisteredVault, RegistryClient, TxHandle, TxReceipt, VaultRecord,
};
use vaultkit_core::storage::{StorageProvider, StoreMetadata};
use vaultkit_core::types::derive_vault_id;
use vaultkit_core::{VaultError, VaultResult, VaultSession};

/// In-memory content store with delete support and a deletion audit trail.
#[derive(Default)]
pub struct InMemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    deleted: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageProvider for InMemoryStore {
    async fn store(&self, data: Vec<u8>, _metadata: Option<StoreMetadata>) -> VaultResult<String> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.blobs.lock().unwrap().insert(id.clone(), data);
        Ok(id)
    }

    async fn retrieve(&self, content_id: &str) -> VaultResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("no blob {content_id}")))
    }

    async fn delete(&self, content_id: &str) -> VaultResult<()> {
        self.blobs.lock().unwrap().remove(content_id);
        self.deleted.lock().unwrap().push(content_id.to_string());
        Ok(())
    }
}

/// In-memory registry with a settlement ledger and a fault-injection knob.
#[derive(Default)]
pub struct InMemoryRegistry {
    vaults: Mutex<HashMap<B256, VaultRecord>>,
    settlements: Mutex<HashMap<(B256, Address), U256>>,
    failed_txs: Mutex<Vec<B256>>,
    next_tx: AtomicU64,
    fail_next_update: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `update_vault` land as a reverted transaction.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn credit_settlement(&self, commitment: B256, user: Address, amount: U256) {
        *self
            .settlements
            .lock()
            .unwrap()
            .entry((commitment, user))
            .or_default() += amount;
    }

    fn fresh_tx(&self) -> B256 {
        B256::with_last_byte(
            u8::try_from(self.next_tx.fetch_add(1, Ordering::SeqCst) % 251 + 1).unwrap(),
        )
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn get_vault(&self, vault_id: B256) -> VaultResult<VaultRecord> {
        self.vaults
            .lock()
            .unwrap()
            .get(&vault_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("vault {vault_id} is not registered")))
    }

    async fn update_vault(
        &self,
        vault_id: B256,
        manifest_location: &str,
    ) -> VaultResult<TxHandle> {
        let tx = self.fresh_tx();
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            self.failed_txs.lock().unwrap().push(tx);
            return Ok(TxHandle(tx));
        }
        let mut vaults = self.vaults.lock().unwrap();
        let record = vaults
            .get_mut(&vault_id)
            .ok_or_else(|| VaultError::NotFound(format!("vault {vault_id} is not registered")))?;
        record.manifest_location = manifest_location.to_string();
        Ok(TxHandle(tx))
    }

    async fn register_data_source(
        &self,
        name: &str,
        owner: Address,
    ) -> VaultResult<RegisteredVault> {
        let vault_id = derive_vault_id(name, owner);
        self.vaults.lock().unwrap().insert(
            vault_id,
            VaultRecord {
                manifest_location: String::new(),
                owner,
                name: name.to_string(),
            },
        );
        Ok(RegisteredVault {
            tx: self.fresh_tx(),
            vault_id,
        })
    }

    async fn pay(&self, authorization: PaymentAuthorization) -> VaultResult<TxHandle> {
        self.credit_settlement(
            authorization.commitment,
            authorization.from,
            authorization.value,
        );
        Ok(TxHandle(self.fresh_tx()))
    }

    async fn check_settlement(&self, commitment: B256, user: Address) -> VaultResult<U256> {
        Ok(self
            .settlements
            .lock()
            .unwrap()
            .get(&(commitment, user))
            .copied()
            .unwrap_or_default())
    }

    async fn wait_for_transaction(&self, tx: TxHandle) -> VaultResult<TxReceipt> {
        let success = !self.failed_txs.lock().unwrap().contains(&tx.0);
        Ok(TxReceipt { tx: tx.0, success })
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<InMemoryRegistry>,
    pub kms: Arc<dyn KeyManagementProvider>,
}

impl Harness {
    /// Builds a harness with a trusted-mode sandbox provider, connected.
    pub async fn trusted() -> Self {
        Self::with_sandbox(SandboxConfig {
            rpc_url: None,
            trusted_mode: true,
        })
        .await
    }

    pub async fn with_sandbox(config: SandboxConfig) -> Self {
        let kms = vaultkit_core::kms::create_provider(KmsConfig::Sandbox(config));
        kms.connect().await.unwrap();
        Self {
            store: InMemoryStore::new(),
            registry: InMemoryRegistry::new(),
            kms,
        }
    }

    pub fn session(&self, signer: Option<Address>) -> VaultSession {
        VaultSession::new(
            self.store.clone(),
            self.registry.clone(),
            self.kms.clone(),
            signer,
        )
    }
}
