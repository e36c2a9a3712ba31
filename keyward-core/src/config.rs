//! Session configuration
//!
//! Loaded from environment variables with sensible defaults; front ends may
//! override individual fields.

use std::time::Duration;

use crate::endpoints::{EndpointLayout, Endpoints};
use crate::error::Result;

/// Relying party used when `KEYWARD_SERVER_URL` is unset.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/";

/// How long the operator gets to touch the key.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for relying-party calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relying-party URLs
    pub endpoints: Endpoints,
    /// Bound on each authenticator call (default: 30s)
    pub device_timeout: Duration,
    /// Bound on each relying-party request (default: 10s)
    pub http_timeout: Duration,
}

impl SessionConfig {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Load configuration from environment variables
    ///
    /// - `KEYWARD_SERVER_URL` (default: `http://localhost:8080/`)
    /// - `KEYWARD_ENDPOINT_LAYOUT`: `fixed` or `per-identity` (default)
    /// - `KEYWARD_DEVICE_TIMEOUT_SECS` (default: 30)
    /// - `KEYWARD_HTTP_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Self> {
        let server_url =
            std::env::var("KEYWARD_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let layout = match std::env::var("KEYWARD_ENDPOINT_LAYOUT") {
            Ok(value) => value.parse()?,
            Err(_) => EndpointLayout::default(),
        };

        let device_timeout = std::env::var("KEYWARD_DEVICE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DEVICE_TIMEOUT);

        let http_timeout = std::env::var("KEYWARD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        Ok(Self {
            endpoints: Endpoints::parse(&server_url, layout)?,
            device_timeout,
            http_timeout,
        })
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_timeouts() {
        let endpoints = Endpoints::parse(DEFAULT_SERVER_URL, EndpointLayout::Fixed).unwrap();
        let config = SessionConfig::new(endpoints);
        assert_eq!(config.device_timeout, DEFAULT_DEVICE_TIMEOUT);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.endpoints.layout(), EndpointLayout::Fixed);
    }

    #[test]
    fn test_from_env() {
        // Only test in this binary touching KEYWARD_* variables.
        std::env::set_var("KEYWARD_SERVER_URL", "https://rp.example/u2f/");
        std::env::set_var("KEYWARD_ENDPOINT_LAYOUT", "fixed");
        std::env::set_var("KEYWARD_DEVICE_TIMEOUT_SECS", "5");
        std::env::set_var("KEYWARD_HTTP_TIMEOUT_SECS", "not-a-number");

        let config = SessionConfig::from_env().unwrap();
        assert_eq!(config.endpoints.base().as_str(), "https://rp.example/u2f/");
        assert_eq!(config.endpoints.layout(), EndpointLayout::Fixed);
        assert_eq!(config.device_timeout, Duration::from_secs(5));
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);

        std::env::set_var("KEYWARD_ENDPOINT_LAYOUT", "sideways");
        assert!(SessionConfig::from_env().is_err());

        for var in [
            "KEYWARD_SERVER_URL",
            "KEYWARD_ENDPOINT_LAYOUT",
            "KEYWARD_DEVICE_TIMEOUT_SECS",
            "KEYWARD_HTTP_TIMEOUT_SECS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_builder_overrides() {
        let endpoints = Endpoints::parse(DEFAULT_SERVER_URL, EndpointLayout::default()).unwrap();
        let config = SessionConfig::new(endpoints)
            .with_device_timeout(Duration::from_secs(2))
            .with_http_timeout(Duration::from_millis(500));
        assert_eq!(config.device_timeout, Duration::from_secs(2));
        assert_eq!(config.http_timeout, Duration::from_millis(500));
    }
}
