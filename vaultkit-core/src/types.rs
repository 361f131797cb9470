//! Shared data model: manifests, staged entries and stored payloads.

use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

use crate::crypto::AeadCiphertext;
use crate::predicate::PredicateDescriptor;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// A plaintext file handed to the session for staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    /// Vault-unique label addressing the file.
    pub tag: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
    /// File extension hint, without the dot.
    pub extension: Option<String>,
    /// MIME type hint.
    pub file_type: Option<String>,
}

impl FileData {
    /// Builds a file record with no extension or MIME hints.
    #[must_use]
    pub fn new(tag: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            data,
            extension: None,
            file_type: None,
        }
    }
}

/// One committed manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Vault-unique label.
    pub tag: String,
    /// Storage location of the encrypted payload.
    pub content_id: String,
    /// Position of the entry within the manifest.
    pub index: u32,
    /// Audit record of the access policy protecting the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate_descriptor: Option<PredicateDescriptor>,
    /// File extension hint, without the dot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// MIME type hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// The committed table of contents for a vault.
///
/// Entry order is insertion order; `index` fields are assigned positionally
/// at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultManifest {
    /// Schema version, currently [`MANIFEST_VERSION`].
    pub version: u32,
    /// Entries in insertion order.
    pub entries: Vec<VaultEntry>,
    /// Merkle root over entry content ids; reserved, zero until populated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<B256>,
}

impl VaultManifest {
    /// Builds a fresh manifest at the current schema version.
    #[must_use]
    pub const fn new(entries: Vec<VaultEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries,
            tree: None,
        }
    }

    /// Looks up an entry by tag.
    #[must_use]
    pub fn entry(&self, tag: &str) -> Option<&VaultEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }
}

/// An entry staged in a session but not yet committed to a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Vault-unique label.
    pub tag: String,
    /// Storage location of the already-uploaded encrypted payload.
    pub content_id: String,
    /// Serialized audit record of the protecting policy.
    pub descriptor_json: Option<String>,
    /// File extension hint.
    pub extension: Option<String>,
    /// MIME type hint.
    pub file_type: Option<String>,
}

/// A symmetric key wrapped by a key-management provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Opaque base64 ciphertext of the key material.
    pub ciphertext: String,
    /// Content hash the wrapped key is addressed by.
    pub content_hash: String,
}

/// The stored bundle for one encrypted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Sealed file body.
    pub body: AeadCiphertext,
    /// The wrapped ephemeral key.
    pub wrapped_key: WrappedKey,
    /// Key-release condition evaluated by the custodians.
    pub condition: crate::predicate::AccessCondition,
    /// Inline verifier source, when the policy carries its program with the
    /// payload instead of referencing a published copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

/// Derives the canonical vault identifier from its name and owner.
///
/// `keccak256(keccak256(name) || owner)`, matching the registry contract's
/// derivation so client and chain agree on ids without a lookup.
#[must_use]
pub fn derive_vault_id(name: &str, owner: Address) -> B256 {
    let mut buf = Vec::with_capacity(52);
    buf.extend_from_slice(keccak256(name.as_bytes()).as_slice());
    buf.extend_from_slice(owner.as_slice());
    keccak256(&buf)
}
