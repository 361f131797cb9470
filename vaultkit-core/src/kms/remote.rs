//! HTTP adapter for a hosted key-custodian network.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{VaultError, VaultResult};
use crate::http::HttpClient;
use crate::predicate::AccessCondition;
use crate::types::WrappedKey;

use super::{DecryptOutcome, DecryptRequest, KeyManagementProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
    /// A connect attempt failed. The provider stays unusable; callers must
    /// construct a fresh instance to retry.
    Poisoned,
}

/// Key-management provider backed by a remote custodian service.
///
/// Speaks a small JSON API: `GET /health` for connection checks,
/// `POST /encrypt`, `POST /decrypt` and `POST /actions`.
pub struct RemoteKmsProvider {
    http: HttpClient,
    endpoint: String,
    state: Mutex<ConnectionState>,
}

#[derive(Serialize)]
struct EncryptBody<'a> {
    key_material: String,
    condition: &'a AccessCondition,
}

#[derive(Deserialize)]
struct ActionResponse {
    reference: String,
}

impl RemoteKmsProvider {
    /// Binds a provider to its base endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into(),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }

    async fn require_connected(&self) -> VaultResult<()> {
        match *self.state.lock().await {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(VaultError::Configuration(
                "key-management provider is not connected".to_string(),
            )),
            ConnectionState::Poisoned => Err(VaultError::Configuration(
                "key-management provider failed to connect and must be recreated".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl KeyManagementProvider for RemoteKmsProvider {
    async fn connect(&self) -> VaultResult<()> {
        let mut state = self.state.lock().await;
        if *state == ConnectionState::Connected {
            return Ok(());
        }

        let health = self.http.send(self.http.get(&self.url("/health"))).await;
        match health {
            Ok(response) if response.status().is_success() => {
                *state = ConnectionState::Connected;
                log::debug!("connected to key-management service at {}", self.endpoint);
                Ok(())
            }
            Ok(response) => {
                *state = ConnectionState::Poisoned;
                Err(VaultError::Upstream(format!(
                    "key-management health check returned {}",
                    response.status()
                )))
            }
            Err(err) => {
                *state = ConnectionState::Poisoned;
                Err(err)
            }
        }
    }

    async fn disconnect(&self) -> VaultResult<()> {
        *self.state.lock().await = ConnectionState::Disconnected;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.state.lock().await == ConnectionState::Connected
    }

    async fn encrypt(
        &self,
        key_material: &[u8],
        condition: &AccessCondition,
    ) -> VaultResult<WrappedKey> {
        use base64::Engine as _;

        self.require_connected().await?;
        let body = EncryptBody {
            key_material: base64::engine::general_purpose::STANDARD.encode(key_material),
            condition,
        };
        let response = self
            .http
            .send(self.http.post(&self.url("/encrypt")).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(VaultError::Upstream(format!(
                "encrypt failed with status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn decrypt(&self, request: DecryptRequest) -> DecryptOutcome {
        if let Err(err) = self.require_connected().await {
            return DecryptOutcome::denied(err.to_string(), vec![]);
        }

        let sent = self
            .http
            .post(&self.url("/decrypt"))
            .json(&request);
        match self.http.send(sent).await {
            Ok(response) if response.status().is_success() => {
                match response.json::<DecryptOutcome>().await {
                    Ok(outcome) => outcome,
                    Err(err) => DecryptOutcome::denied(
                        format!("malformed decrypt response: {err}"),
                        vec![],
                    ),
                }
            }
            Ok(response) => DecryptOutcome::denied(
                format!("decrypt failed with status {}", response.status()),
                vec![],
            ),
            Err(err) => DecryptOutcome::denied(err.to_string(), vec![]),
        }
    }

    async fn upload_action(&self, source: &str) -> VaultResult<String> {
        self.require_connected().await?;
        let response = self
            .http
            .send(
                self.http
                    .post(&self.url("/actions"))
                    .json(&serde_json::json!({ "source": source })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(VaultError::Upstream(format!(
                "action upload failed with status {}",
                response.status()
            )));
        }
        let parsed: ActionResponse = response.json().await?;
        Ok(parsed.reference)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use super::*;
    use crate::kms::AuthContext;

    fn condition() -> AccessCondition {
        AccessCondition::WalletOwnership {
            address: Address::repeat_byte(1),
            chain: "baseSepolia".to_string(),
        }
    }

    async fn connected_provider(server: &mockito::Server) -> RemoteKmsProvider {
        let provider = RemoteKmsProvider::new(server.url());
        provider.connect().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn connect_requires_healthy_service() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let provider = RemoteKmsProvider::new(server.url());
        assert!(!provider.is_connected().await);
        provider.connect().await.unwrap();
        assert!(provider.is_connected().await);

        provider.disconnect().await.unwrap();
        assert!(!provider.is_connected().await);
    }

    #[tokio::test]
    async fn failed_connect_poisons_the_provider() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(404)
            .create_async()
            .await;

        let provider = RemoteKmsProvider::new(server.url());
        assert!(provider.connect().await.is_err());

        // Subsequent use reports the poisoned state, not "disconnected".
        match provider.encrypt(&[0u8; 32], &condition()).await {
            Err(VaultError::Configuration(message)) => {
                assert!(message.contains("recreated"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn encrypt_round_trips_wrapped_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let mock = server
            .mock("POST", "/encrypt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ciphertext":"b64blob","content_hash":"abc123"}"#)
            .create_async()
            .await;

        let provider = connected_provider(&server).await;
        let wrapped = provider.encrypt(&[7u8; 32], &condition()).await.unwrap();
        assert_eq!(wrapped.ciphertext, "b64blob");
        assert_eq!(wrapped.content_hash, "abc123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn decrypt_failures_are_outcomes_not_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/decrypt")
            .with_status(403)
            .create_async()
            .await;

        let provider = connected_provider(&server).await;
        let outcome = provider
            .decrypt(DecryptRequest {
                ciphertext: "blob".to_string(),
                content_hash: "hash".to_string(),
                verifier: None,
                params: serde_json::Map::new(),
                auth_context: AuthContext::unsigned(Address::repeat_byte(2)),
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("403"));
    }

    #[tokio::test]
    async fn upload_action_returns_reference() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/actions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"reference":"QmExample"}"#)
            .create_async()
            .await;

        let provider = connected_provider(&server).await;
        assert_eq!(
            provider.upload_action("{}").await.unwrap(),
            "QmExample"
        );
    }
}
