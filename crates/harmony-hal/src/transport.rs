//! Wire transport to the actuator controller.
//!
//! [`ActuatorClient`][crate::actuator_client::ActuatorClient] never talks to
//! `reqwest` directly; it goes through the [`Transport`] trait so the policy
//! layer can be exercised against in-process transports.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// Transient failure of a single network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call did not complete within its per-call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The controller could not be reached (refused, unroutable, reset).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// A request/response channel to the actuator controller.
///
/// Implementations return the HTTP status code of the response; interpreting
/// it (2xx vs. not) is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST` a JSON `body` to `path`, giving up after `timeout`.
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, TransportError>;

    /// `GET` `path`, giving up after `timeout`.
    async fn get(&self, path: &str, timeout: Duration) -> Result<u16, TransportError>;
}

/// [`Transport`] over HTTP/1.1 using a shared `reqwest` connection pool.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the controller at `base_url`.
    ///
    /// A bare `host:port` is accepted and treated as `http://host:port`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            client: reqwest::Client::new(),
        }
    }

    /// The normalised base URL, always scheme-qualified and without a
    /// trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let url = self.url(path);
        trace!(%url, %body, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        Ok(response.status().as_u16())
    }

    async fn get(&self, path: &str, timeout: Duration) -> Result<u16, TransportError> {
        let url = self.url(path);
        trace!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        Ok(response.status().as_u16())
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
