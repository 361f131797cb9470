//! Shared HTTP client with retry middleware for transient failures.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::{VaultError, VaultResult};

/// A thin wrapper over `reqwest` applying a request timeout, a user agent and
/// exponential-backoff retries on transient failures (HTTP 429/5xx, connect
/// and timeout errors).
pub(crate) struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpClient {
    pub(crate) fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3, // total attempts = 4
        }
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("vaultkit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends a built request, retrying transient failures with backoff.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> VaultResult<Response> {
        let Some(template) = builder.try_clone() else {
            // Streaming bodies cannot be replayed; send once without retries.
            return execute(builder).await.map_err(SendError::into_vault);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let attempt = template.try_clone().ok_or_else(|| {
                SendError::permanent("request template is not cloneable".to_string())
            })?;
            execute(attempt).await
        })
        .retry(backoff)
        .when(SendError::is_retryable)
        .await
        .map_err(SendError::into_vault)
    }
}

#[derive(Debug)]
struct SendError {
    message: String,
    retryable: bool,
}

impl SendError {
    const fn retryable(message: String) -> Self {
        Self {
            message,
            retryable: true,
        }
    }

    const fn permanent(message: String) -> Self {
        Self {
            message,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn into_vault(self) -> VaultError {
        VaultError::Upstream(self.message)
    }
}

async fn execute(builder: RequestBuilder) -> Result<Response, SendError> {
    let (client, request) = builder.build_split();
    let request = request
        .map_err(|err| SendError::permanent(format!("request build failed: {err}")))?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(SendError::retryable(format!(
                    "{url} returned status {status}"
                )));
            }
            Ok(response)
        }
        Err(err) if err.is_timeout() || err.is_connect() => Err(SendError::retryable(
            format!("{url} timeout/connect error: {err}"),
        )),
        Err(err) => Err(SendError::permanent(format!("{url} failed: {err}"))),
    }
}
