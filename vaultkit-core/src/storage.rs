//! Content storage abstraction.

use async_trait::async_trait;

use crate::error::{VaultError, VaultResult};

/// Optional metadata attached to a stored blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Display name for the blob.
    pub name: Option<String>,
    /// MIME type hint.
    pub content_type: Option<String>,
}

/// A content-addressed (or provider-addressed) blob store.
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe to share across tasks.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stores a blob and returns its location identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Upstream`] when the store is unreachable or
    /// rejects the blob.
    async fn store(&self, data: Vec<u8>, metadata: Option<StoreMetadata>) -> VaultResult<String>;

    /// Retrieves a blob by its location identifier.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for unknown identifiers and
    /// [`VaultError::Upstream`] for transport failures.
    async fn retrieve(&self, content_id: &str) -> VaultResult<Vec<u8>>;

    /// Deletes a blob. Best-effort; stores without deletion support keep the
    /// default implementation.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Upstream`] when unsupported or when the delete
    /// fails.
    async fn delete(&self, content_id: &str) -> VaultResult<()> {
        let _ = content_id;
        Err(VaultError::Upstream(
            "delete not supported by this storage provider".to_string(),
        ))
    }
}
