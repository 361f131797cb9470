//! Minimal JSON-RPC client for read-only chain access.

use alloy_primitives::Address;
use serde_json::{json, Value};

use crate::error::{VaultError, VaultResult};
use crate::http::HttpClient;

/// A JSON-RPC 2.0 client bound to a single endpoint.
///
/// Only read paths are exercised: the sandbox evaluates `eth_call` probes
/// against registry and settlement contracts and never submits transactions.
pub struct RpcClient {
    http: HttpClient,
    endpoint: String,
}

impl RpcClient {
    /// Binds a client to a JSON-RPC endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Issues a JSON-RPC call and returns the `result` value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Upstream`] for transport failures and for
    /// JSON-RPC level errors reported by the node.
    pub async fn call(&self, method: &str, params: Value) -> VaultResult<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .send(self.http.post(&self.endpoint).json(&request))
            .await?;
        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            return Err(VaultError::Upstream(format!(
                "rpc {method} failed: {error}"
            )));
        }
        body.get("result").cloned().ok_or_else(|| {
            VaultError::Upstream(format!("rpc {method} returned no result"))
        })
    }

    /// Executes a read-only `eth_call` and returns the raw return data.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Upstream`] for transport or node errors and when
    /// the node returns a malformed hex payload.
    pub async fn eth_call(&self, to: Address, calldata: &[u8]) -> VaultResult<Vec<u8>> {
        let result = self
            .call(
                "eth_call",
                json!([
                    {
                        "to": to.to_string(),
                        "data": format!("0x{}", hex::encode(calldata)),
                    },
                    "latest",
                ]),
            )
            .await?;

        let text = result
            .as_str()
            .ok_or_else(|| VaultError::Upstream("eth_call result is not a string".to_string()))?;
        hex::decode(text.trim_start_matches("0x"))
            .map_err(|err| VaultError::Upstream(format!("eth_call returned invalid hex: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn eth_call_decodes_hex_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "eth_call",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x0000ff"}"#)
            .create_async()
            .await;

        let client = RpcClient::new(server.url());
        let data = client
            .eth_call(Address::repeat_byte(0xAA), &[0x01, 0x02])
            .await
            .unwrap();
        assert_eq!(data, vec![0x00, 0x00, 0xFF]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn node_errors_surface_as_upstream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"revert"}}"#)
            .create_async()
            .await;

        let client = RpcClient::new(server.url());
        match client.call("eth_call", json!([])).await {
            Err(VaultError::Upstream(message)) => assert!(message.contains("revert")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
