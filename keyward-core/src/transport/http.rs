//! reqwest-backed relying-party client.
//!
//! One attempt per call: a failed fetch or submit is terminal for the
//! ceremony, so there is no retry or backoff here.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::RelyingPartyClient;
use crate::error::{KeywardError, Result, TransportError, TransportErrorKind};

/// Longest slice of an error body copied into a [`TransportError`].
const MAX_DETAIL_BYTES: usize = 512;

/// JSON-over-HTTP client for the relying party.
pub struct HttpRelyingParty {
    client: Client,
}

impl HttpRelyingParty {
    /// Create a client whose requests give up after `timeout`.
    #[instrument(level = "debug", skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keyward/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                KeywardError::Config(format!("Failed to create HTTP client: {e}"))
            })?;

        debug!("Relying-party HTTP client created");
        Ok(Self { client })
    }

    /// Read a successful response body or classify the failure.
    async fn read(
        method: &'static str,
        url: &Url,
        start: Instant,
        response: std::result::Result<Response, reqwest::Error>,
    ) -> std::result::Result<String, TransportError> {
        let response = response.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            warn!(error = %e, latency_ms, "Request failed");
            TransportError::new(method, url.as_str(), classify(&e), e.to_string())
        })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        let body = response.text().await.map_err(|e| {
            warn!(error = %e, "Failed to read response body");
            TransportError::new(method, url.as_str(), classify(&e), e.to_string())
        })?;

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            warn!(status = %status, latency_ms, "HTTP error status");
            return Err(TransportError::new(
                method,
                url.as_str(),
                TransportErrorKind::Status(status.as_u16()),
                status_detail(status, &body),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl RelyingPartyClient for HttpRelyingParty {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn get_json(&self, url: &Url) -> std::result::Result<Value, TransportError> {
        let start = Instant::now();
        let response = self.client.get(url.clone()).send().await;
        let body = Self::read("GET", url, start, response).await?;

        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Failed to parse JSON response");
            TransportError::malformed("GET", url.as_str(), format!("invalid JSON: {e}"))
        })
    }

    #[instrument(level = "debug", skip(self, body), fields(url = %url))]
    async fn post_json(
        &self,
        url: &Url,
        body: &Value,
    ) -> std::result::Result<Value, TransportError> {
        let start = Instant::now();
        let response = self.client.post(url.clone()).json(body).send().await;
        let reply = Self::read("POST", url, start, response).await?;

        // Acknowledgements are opaque; plain-text bodies are kept as strings.
        let reply = reply.trim();
        if reply.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(reply).unwrap_or_else(|_| Value::String(reply.to_string())))
    }
}

/// Classify a reqwest error.
fn classify(error: &reqwest::Error) -> TransportErrorKind {
    if error.is_decode() {
        TransportErrorKind::Malformed
    } else if let Some(status) = error.status() {
        TransportErrorKind::Status(status.as_u16())
    } else {
        TransportErrorKind::Network
    }
}

fn status_detail(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    let reason = status.canonical_reason().unwrap_or("Unknown status");
    if body.is_empty() {
        return reason.to_string();
    }

    let mut end = body.len().min(MAX_DETAIL_BYTES);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{reason}: {}", &body[..end])
}
