//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a refused key apart from an unreachable server or a
//! ceremony that simply has to be retried later.

use keyward_core::KeywardError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (missing identity).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// The security key refused the request or its reply was unusable.
/// Maps to EX_DATAERR from sysexits.h.
pub const DEVICE_ERROR: i32 = 65;

/// Service unavailable (relying party, platform authenticator).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: i32 = 69;

/// Busy gate or untouched key; trying again later may succeed.
/// Maps to EX_TEMPFAIL from sysexits.h.
pub const TEMPORARY_FAILURE: i32 = 75;

/// Invalid configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// A trigger arrived while another transaction held the gate.
#[derive(Debug)]
pub struct TransactionBusy;

impl std::fmt::Display for TransactionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "another transaction is in flight")
    }
}

impl std::error::Error for TransactionBusy {}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = if err.downcast_ref::<TransactionBusy>().is_some() {
            TEMPORARY_FAILURE
        } else if let Some(err) = err.downcast_ref::<KeywardError>() {
            Self::classify(err)
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }

    fn classify(err: &KeywardError) -> i32 {
        match err {
            KeywardError::MissingIdentity => USAGE_ERROR,
            KeywardError::Authenticator { .. } | KeywardError::MalformedReply(_) => DEVICE_ERROR,
            KeywardError::AuthenticatorUnavailable | KeywardError::Transport(_) => UNAVAILABLE,
            KeywardError::Timeout { .. } => TEMPORARY_FAILURE,
            KeywardError::Config(_) => CONFIG_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use keyward_core::{DeviceErrorCode, TransportError, TransportErrorKind};
    use std::time::Duration;

    fn code_of(err: KeywardError) -> i32 {
        let err = Err::<(), _>(err).context("Ceremony failed").unwrap_err();
        ExitCode::from_anyhow(&err).code
    }

    #[test]
    fn test_classification_sees_through_context() {
        assert_eq!(code_of(KeywardError::MissingIdentity), USAGE_ERROR);
        assert_eq!(
            code_of(KeywardError::Authenticator {
                code: DeviceErrorCode::DeviceIneligible,
                message: None,
            }),
            DEVICE_ERROR
        );
        assert_eq!(code_of(KeywardError::MalformedReply("[]".into())), DEVICE_ERROR);
        assert_eq!(code_of(KeywardError::AuthenticatorUnavailable), UNAVAILABLE);
        assert_eq!(
            code_of(KeywardError::Transport(TransportError::new(
                "GET",
                "http://127.0.0.1:9/register/alice",
                TransportErrorKind::Network,
                "connection refused",
            ))),
            UNAVAILABLE
        );
        assert_eq!(
            code_of(KeywardError::Timeout {
                after: Duration::from_secs(30)
            }),
            TEMPORARY_FAILURE
        );
        assert_eq!(code_of(KeywardError::Config("bad".into())), CONFIG_ERROR);
    }

    #[test]
    fn test_busy_and_unknown_errors() {
        let busy = anyhow::Error::new(TransactionBusy);
        assert_eq!(ExitCode::from_anyhow(&busy).code, TEMPORARY_FAILURE);

        let other = anyhow::anyhow!("something else");
        let exit = ExitCode::from_anyhow(&other);
        assert_eq!(exit.code, GENERAL_ERROR);
        assert_eq!(exit.message.as_deref(), Some("something else"));
    }
}
