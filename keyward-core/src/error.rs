use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// U2F client error codes as reported by the platform authenticator.
///
/// See <https://developers.yubico.com/U2F/Libraries/Client_error_codes.html>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    OtherError,
    BadRequest,
    ConfigurationUnsupported,
    DeviceIneligible,
    /// The device itself gave up waiting for user presence.
    Timeout,
    Unknown(u32),
}

impl DeviceErrorCode {
    /// Map a raw code to its variant. Zero means "no error" and yields `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::OtherError),
            2 => Some(Self::BadRequest),
            3 => Some(Self::ConfigurationUnsupported),
            4 => Some(Self::DeviceIneligible),
            5 => Some(Self::Timeout),
            other => Some(Self::Unknown(other)),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::OtherError => 1,
            Self::BadRequest => 2,
            Self::ConfigurationUnsupported => 3,
            Self::DeviceIneligible => 4,
            Self::Timeout => 5,
            Self::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OtherError => "OTHER_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::ConfigurationUnsupported => "CONFIGURATION_UNSUPPORTED",
            Self::DeviceIneligible => "DEVICE_INELIGIBLE",
            Self::Timeout => "TIMEOUT",
            Self::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{} ({name})", self.code())
    }
}

/// What went wrong on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection, DNS, TLS or request timeout failure.
    Network,
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The body could not be decoded or had the wrong shape.
    Malformed,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Status(status) => write!(f, "HTTP status {status}"),
            Self::Malformed => write!(f, "malformed response"),
        }
    }
}

/// A failed request to the relying party.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{method} {url} failed with {kind}: {detail}")]
pub struct TransportError {
    pub method: &'static str,
    pub url: String,
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(
        method: &'static str,
        url: impl Into<String>,
        kind: TransportErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(method: &'static str, url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(method, url, TransportErrorKind::Malformed, detail)
    }
}

#[derive(Error, Debug)]
pub enum KeywardError {
    #[error("No user identity provided")]
    MissingIdentity,

    #[error("No security key support is available on this host")]
    AuthenticatorUnavailable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authenticator error code {code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Authenticator {
        code: DeviceErrorCode,
        message: Option<String>,
    },

    #[error("Timed out after {after:?} waiting for the security key")]
    Timeout { after: Duration },

    #[error("Malformed authenticator reply: {0}")]
    MalformedReply(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeywardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_code_is_not_an_error() {
        assert_eq!(DeviceErrorCode::from_code(0), None);
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(
            DeviceErrorCode::from_code(4),
            Some(DeviceErrorCode::DeviceIneligible)
        );
        assert_eq!(DeviceErrorCode::from_code(5), Some(DeviceErrorCode::Timeout));
        assert_eq!(
            DeviceErrorCode::from_code(42),
            Some(DeviceErrorCode::Unknown(42))
        );
        assert_eq!(DeviceErrorCode::Unknown(42).code(), 42);
    }

    #[test]
    fn test_authenticator_error_message_contains_code() {
        let err = KeywardError::Authenticator {
            code: DeviceErrorCode::DeviceIneligible,
            message: None,
        };
        assert_eq!(
            err.to_string(),
            "Authenticator error code 4 (DEVICE_INELIGIBLE)"
        );

        let err = KeywardError::Authenticator {
            code: DeviceErrorCode::BadRequest,
            message: Some("appId mismatch".into()),
        };
        assert!(err.to_string().ends_with(": appId mismatch"));
    }

    #[test]
    fn test_timeout_display_keeps_sub_second_bounds() {
        let err = KeywardError::Timeout {
            after: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 250ms waiting for the security key"
        );

        let err = KeywardError::Timeout {
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new(
            "GET",
            "https://rp.example/register/alice",
            TransportErrorKind::Status(503),
            "Service Unavailable",
        );
        assert_eq!(
            err.to_string(),
            "GET https://rp.example/register/alice failed with HTTP status 503: Service Unavailable"
        );
    }
}
