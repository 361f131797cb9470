//! The vault session: staging, commit and gated decryption.
//!
//! A session is a client-side unit of work against one registry, one content
//! store and one key-management provider. Files are encrypted and uploaded
//! eagerly as they are staged; nothing becomes visible to readers until
//! `commit_vault` publishes a new manifest and the registry update lands.

use std::sync::Arc;

use alloy_primitives::{Address, B256};

use crate::crypto::{open, seal, EphemeralKey};
use crate::error::{VaultError, VaultResult};
use crate::kms::{AuthContext, DecryptRequest, KeyManagementProvider, VerifierRef};
use crate::predicate::Predicate;
use crate::registry::{RegisteredVault, RegistryClient, VaultRecord};
use crate::staging::StagingMap;
use crate::storage::{StorageProvider, StoreMetadata};
use crate::types::{
    EncryptedPayload, FileData, PendingEntry, VaultEntry, VaultManifest,
};

/// A unit of work against one vault deployment.
pub struct VaultSession {
    storage: Arc<dyn StorageProvider>,
    registry: Arc<dyn RegistryClient>,
    kms: Arc<dyn KeyManagementProvider>,
    signer: Option<Address>,
    staging: StagingMap,
}

impl VaultSession {
    /// Builds a session over the given collaborators.
    ///
    /// `signer` is the wallet identity used for writes and asserted on
    /// decrypt calls; read-only sessions may omit it.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        registry: Arc<dyn RegistryClient>,
        kms: Arc<dyn KeyManagementProvider>,
        signer: Option<Address>,
    ) -> Self {
        Self {
            storage,
            registry,
            kms,
            signer,
            staging: StagingMap::default(),
        }
    }

    /// The wallet identity bound to this session, when present.
    #[must_use]
    pub const fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    /// Number of entries currently staged.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staging.len()
    }

    fn require_signer(&self) -> VaultResult<Address> {
        self.signer.ok_or_else(|| {
            VaultError::Configuration("session has no signing identity bound".to_string())
        })
    }

    /// Encrypts a file under `predicate` and stages it.
    ///
    /// The file body is sealed under a fresh ephemeral key, the key is
    /// wrapped by the key-management provider, and the resulting bundle is
    /// uploaded immediately. Re-staging an existing tag replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] without a signer, and crypto,
    /// serialization or upstream errors from the pipeline stages.
    pub async fn add_file(&mut self, file: FileData, predicate: &Predicate) -> VaultResult<()> {
        self.require_signer()?;

        let compiled = predicate.compile(self.kms.as_ref()).await?;

        let key = EphemeralKey::generate();
        let body = seal(&key, &file.data)?;
        let wrapped_key = self
            .kms
            .encrypt(key.as_bytes(), &compiled.condition)
            .await?;
        drop(key);

        // Conditions without a published program carry their verifier source
        // inline with the payload.
        let verifier = if compiled.condition.program_reference().is_none() {
            Some(compiled.program.to_source()?)
        } else {
            None
        };

        let payload = EncryptedPayload {
            body,
            wrapped_key,
            condition: compiled.condition,
            verifier,
        };
        let content_id = self
            .storage
            .store(
                serde_json::to_vec(&payload)?,
                Some(StoreMetadata {
                    name: Some(file.tag.clone()),
                    content_type: file.file_type.clone(),
                }),
            )
            .await?;

        log::debug!("staged {} at {content_id}", file.tag);
        self.staging.insert(PendingEntry {
            tag: file.tag,
            content_id,
            descriptor_json: Some(serde_json::to_string(&compiled.descriptor)?),
            extension: file.extension,
            file_type: file.file_type,
        });
        Ok(())
    }

    /// Unstages a pending entry. Returns whether the tag was staged.
    pub fn remove_file(&mut self, tag: &str) -> bool {
        self.staging.remove(tag)
    }

    /// Stages a batch of files against an existing vault and commits.
    ///
    /// With `overwrite` false, entries from the vault's current manifest are
    /// carried into staging first, so the commit is additive; staged files
    /// replace same-tag carryovers. With `overwrite` true the new batch
    /// becomes the entire vault. Returns the new manifest location.
    ///
    /// # Errors
    ///
    /// Propagates the same errors as [`Self::add_file`] and
    /// [`Self::commit_vault`], plus registry and storage errors while
    /// loading the existing manifest.
    pub async fn upload<F>(
        &mut self,
        vault_id: B256,
        files: Vec<FileData>,
        mut predicate_for: F,
        overwrite: bool,
    ) -> VaultResult<String>
    where
        F: FnMut(&FileData) -> Predicate,
    {
        if !overwrite {
            if let Some(manifest) = self.get_manifest(vault_id).await? {
                for entry in manifest.entries {
                    let descriptor_json = entry
                        .predicate_descriptor
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?;
                    self.staging.insert(PendingEntry {
                        tag: entry.tag,
                        content_id: entry.content_id,
                        descriptor_json,
                        extension: entry.extension,
                        file_type: entry.file_type,
                    });
                }

                // The superseded manifest blob is garbage after commit.
                // Deletion is best-effort; many stores do not support it.
                let record = self.registry.get_vault(vault_id).await?;
                if let Err(err) = self.storage.delete(&record.manifest_location).await {
                    log::warn!(
                        "could not delete superseded manifest {}: {err}",
                        record.manifest_location
                    );
                }
            }
        }

        for file in files {
            let predicate = predicate_for(&file);
            self.add_file(file, &predicate).await?;
        }
        self.commit_vault(vault_id).await
    }

    /// Publishes the staged entries as the vault's new manifest.
    ///
    /// Staging is cleared only after the registry update reaches a
    /// successful receipt; on any failure the staged entries remain intact
    /// so the commit can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Staging`] when nothing is staged and
    /// [`VaultError::Upstream`] when the manifest upload or registry update
    /// fails.
    pub async fn commit_vault(&mut self, vault_id: B256) -> VaultResult<String> {
        self.require_signer()?;
        if self.staging.is_empty() {
            return Err(VaultError::Staging(
                "nothing staged; stage files before committing".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(self.staging.len());
        for (index, pending) in self.staging.iter().enumerate() {
            let predicate_descriptor = pending
                .descriptor_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            entries.push(VaultEntry {
                tag: pending.tag.clone(),
                content_id: pending.content_id.clone(),
                index: u32::try_from(index).map_err(|_| {
                    VaultError::Staging("too many staged entries".to_string())
                })?,
                predicate_descriptor,
                extension: pending.extension.clone(),
                file_type: pending.file_type.clone(),
            });
        }

        let manifest = VaultManifest::new(entries);
        let location = self
            .storage
            .store(serde_json::to_vec(&manifest)?, None)
            .await?;

        let tx = self.registry.update_vault(vault_id, &location).await?;
        let receipt = self.registry.wait_for_transaction(tx).await?;
        if !receipt.success {
            return Err(VaultError::Upstream(format!(
                "registry update reverted in transaction {}",
                receipt.tx
            )));
        }

        log::info!(
            "committed {} entries to vault {vault_id} at {location}",
            manifest.entries.len()
        );
        self.staging.clear();
        Ok(location)
    }

    /// Decrypts one committed file, subject to its access policy.
    ///
    /// `auth_context` carries the caller's proof material (address plus an
    /// optional wallet signature) to the key-management provider. When
    /// omitted, an unsigned assertion of the session signer is used.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] when no context is supplied and
    /// no signer is bound, [`VaultError::NotFound`] for unknown vaults or
    /// tags, [`VaultError::AccessDenied`] when the policy rejects the
    /// caller, and crypto errors when released key material fails to open
    /// the body.
    pub async fn decrypt_file(
        &self,
        vault_id: B256,
        tag: &str,
        auth_context: Option<AuthContext>,
    ) -> VaultResult<Vec<u8>> {
        let auth_context = match auth_context {
            Some(context) => context,
            None => AuthContext::unsigned(self.require_signer()?),
        };

        let entry = self.get_entry(vault_id, tag).await?;
        let raw = self.storage.retrieve(&entry.content_id).await?;
        let payload: EncryptedPayload = serde_json::from_slice(&raw)?;

        let verifier = match &payload.verifier {
            Some(source) => Some(VerifierRef::Inline {
                source: source.clone(),
            }),
            None => payload
                .condition
                .program_reference()
                .map(|reference| VerifierRef::Reference {
                    reference: reference.to_string(),
                }),
        };

        let outcome = self
            .kms
            .decrypt(DecryptRequest {
                ciphertext: payload.wrapped_key.ciphertext.clone(),
                content_hash: payload.wrapped_key.content_hash.clone(),
                verifier,
                params: payload.condition.invocation_params(),
                auth_context,
            })
            .await;

        for line in &outcome.logs {
            log::debug!("verifier: {line}");
        }
        if !outcome.success {
            return Err(VaultError::AccessDenied(
                outcome
                    .error
                    .unwrap_or_else(|| "policy rejected the caller".to_string()),
            ));
        }
        let released = outcome.data.ok_or_else(|| {
            VaultError::Crypto("provider approved but released no key material".to_string())
        })?;

        let key = EphemeralKey::from_bytes(&released)?;
        open(&key, &payload.body)
    }

    /// Registers a new vault owned by the session signer.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] without a signer and
    /// [`VaultError::Upstream`] when registration fails or reverts.
    pub async fn register_data_source(&self, name: &str) -> VaultResult<RegisteredVault> {
        let owner = self.require_signer()?;
        let registered = self.registry.register_data_source(name, owner).await?;
        let receipt = self
            .registry
            .wait_for_transaction(crate::registry::TxHandle(registered.tx))
            .await?;
        if !receipt.success {
            return Err(VaultError::Upstream(format!(
                "vault registration reverted in transaction {}",
                receipt.tx
            )));
        }
        Ok(registered)
    }

    /// Fetches the registry record for a vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for unregistered vaults.
    pub async fn get_vault(&self, vault_id: B256) -> VaultResult<VaultRecord> {
        self.registry.get_vault(vault_id).await
    }

    /// Fetches and parses a vault's committed manifest.
    ///
    /// Returns `Ok(None)` for a registered vault that has never committed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for unregistered vaults and storage
    /// or parse errors for unreadable manifests.
    pub async fn get_manifest(&self, vault_id: B256) -> VaultResult<Option<VaultManifest>> {
        let record = self.registry.get_vault(vault_id).await?;
        if record.manifest_location.is_empty() {
            return Ok(None);
        }
        let raw = self.storage.retrieve(&record.manifest_location).await?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Looks up one committed manifest entry by tag.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] when the vault has no manifest or no
    /// entry with the given tag.
    pub async fn get_entry(&self, vault_id: B256, tag: &str) -> VaultResult<VaultEntry> {
        let manifest = self.get_manifest(vault_id).await?.ok_or_else(|| {
            VaultError::NotFound(format!("vault {vault_id} has no committed manifest"))
        })?;
        manifest
            .entry(tag)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("no entry tagged {tag}")))
    }
}
