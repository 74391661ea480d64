//! HTTP client for index probes
//!
//! A thin wrapper over reqwest exposing exactly the two operations the
//! publish flow needs: a lightweight HEAD (connectivity precheck, project
//! page probe) and a JSON GET (release metadata). Both raise a typed
//! transport error on failure. The `IndexTransport` trait is the seam that
//! lets the precheck and the release poller run against a stub in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by index probes
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("リクエストに失敗しました: {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTPエラー応答: {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("応答の解析に失敗しました: {url}: {message}")]
    Decode { url: String, message: String },
}

/// Transport abstraction over the package index
#[async_trait]
pub trait IndexTransport: Send + Sync {
    /// Lightweight probe; any non-error response means "reachable"
    async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<(), HttpError>;

    /// Fetch and decode a JSON document
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, HttpError>;
}

/// HTTP client with a fixed request timeout
///
/// The underlying connection pool is released when the client is dropped,
/// on every exit path.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with the given request timeout
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl IndexTransport for HttpClient {
    async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<(), HttpError> {
        let mut request = self.client.head(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, HttpError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| HttpError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}
