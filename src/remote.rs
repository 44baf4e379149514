//! HTTP client for remote collaborators.
//!
//! Summarization and estimation can be delegated to JSON-over-HTTP services.
//! The pipeline itself is synchronous, so [`BlockingRemoteClient`] drives the
//! async client on a private current-thread runtime.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout for remote calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    /// Full endpoint URL
    pub url: String,
    /// Optional bearer token
    pub token: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }

    /// Endpoint host, for log fields.
    pub fn host(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        rest.split(['/', '?']).next().unwrap_or(rest)
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote config error: {0}")]
    Config(String),
    #[error("remote network error: {0}")]
    Network(String),
    #[error("remote server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("remote serialization error: {0}")]
    Serialization(String),
}

/// Async JSON client for one endpoint.
pub struct RemoteClient {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        if !(config.url.starts_with("http://") || config.url.starts_with("https://")) {
            return Err(RemoteError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                config.url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("care-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// POST `body` as JSON and decode the JSON response.
    pub async fn post_json<B, T>(&self, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(&self.config.url).json(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::Serialization(e.to_string()))
    }

    /// POST a url-encoded form, ignoring the response body.
    pub async fn post_form<F>(&self, form: &F) -> Result<(), RemoteError>
    where
        F: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(&self.config.url)
            .form(form)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(RemoteError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Blocking wrapper for use from the synchronous pipeline.
///
/// Must not be called from inside another tokio runtime.
pub struct BlockingRemoteClient {
    inner: RemoteClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingRemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RemoteError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: RemoteClient::new(config)?,
            runtime,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        self.inner.config()
    }

    pub fn post_json<B, T>(&self, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.runtime.block_on(self.inner.post_json(body))
    }

    pub fn post_form<F>(&self, form: &F) -> Result<(), RemoteError>
    where
        F: Serialize + ?Sized,
    {
        self.runtime.block_on(self.inner.post_form(form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_host() {
        let config = RemoteConfig::new("https://classifier.local:8443/v1/estimate?x=1", None);
        assert_eq!(config.host(), "classifier.local:8443");
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = RemoteClient::new(RemoteConfig::new("ftp://example.org", None));
        assert!(matches!(err, Err(RemoteError::Config(_))));
    }

    #[test]
    fn test_unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is not expected to serve HTTP locally
        let client =
            BlockingRemoteClient::new(RemoteConfig::new("http://127.0.0.1:9/estimate", None))
                .unwrap();
        let result: Result<serde_json::Value, _> = client.post_json(&serde_json::json!({}));
        assert!(matches!(result, Err(RemoteError::Network(_))));
    }
}
