//! Platform authenticator bridge.
//!
//! The platform exposes the U2F `register` / `sign` operations as
//! callbacks that always deliver a JSON reply, possibly carrying an
//! `errorCode`. [`AuthenticatorBridge`] turns that into one async call that
//! yields exactly one of:
//!
//! - a valid [`Assertion`]
//! - [`KeywardError::Authenticator`] for a non-zero device error code
//! - [`KeywardError::Timeout`] when the device stays silent past the bound
//!
//! The device call and the timer race inside [`tokio::time::timeout`],
//! which polls the device first, so a reply that lands on the deadline wins.

mod mock;

pub use mock::{DeviceCall, DeviceOperation, MockAuthenticator};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::ceremony::CeremonyKind;
use crate::error::{DeviceErrorCode, KeywardError, Result};
use crate::log::ActionLog;
use crate::transport::Challenge;

/// Opaque key handle of an already registered credential.
pub type KeyHandle = String;

/// The host's U2F capability.
///
/// Mirrors the browser U2F API: replies are JSON objects, and failures are
/// reported in-band through `errorCode` rather than as `Err` values.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether a security key capability exists on this host.
    fn is_available(&self) -> bool;

    /// Create a credential for one of `requests`, skipping `registered_keys`.
    async fn register(
        &self,
        requests: Vec<Value>,
        registered_keys: Vec<KeyHandle>,
        timeout: Duration,
    ) -> Value;

    /// Sign one of `requests` with any key the device recognises.
    async fn sign(&self, requests: Vec<Value>, timeout: Duration) -> Value;
}

/// Device reply free of any error code. Safe to submit to the relying party.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion(Value);

impl Assertion {
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Classify a raw device reply.
///
/// The reply must be a JSON object. A missing, `null`, zero, or empty
/// `errorCode` means success; anything else is an authenticator error.
pub fn normalize_reply(reply: Value) -> Result<Assertion> {
    if !reply.is_object() {
        return Err(KeywardError::MalformedReply(format!(
            "expected a JSON object, got {reply}"
        )));
    }

    let code = match reply.get("errorCode") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_u64().and_then(|c| u32::try_from(c).ok()) {
            Some(code) => DeviceErrorCode::from_code(code),
            None => {
                return Err(KeywardError::MalformedReply(format!(
                    "unrecognized errorCode {n}"
                )))
            }
        },
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => match s.trim().parse::<u32>() {
            Ok(code) => DeviceErrorCode::from_code(code),
            Err(_) => {
                return Err(KeywardError::MalformedReply(format!(
                    "unrecognized errorCode \"{s}\""
                )))
            }
        },
        Some(other) => {
            return Err(KeywardError::MalformedReply(format!(
                "unrecognized errorCode {other}"
            )))
        }
    };

    match code {
        Some(code) => Err(KeywardError::Authenticator {
            code,
            message: reply
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        None => Ok(Assertion(reply)),
    }
}

/// Clears the awaiting flag however the device call ends.
struct AwaitingDevice<'a>(&'a AtomicBool);

impl<'a> AwaitingDevice<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for AwaitingDevice<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Uniform async front for the platform authenticator.
pub struct AuthenticatorBridge {
    platform: Arc<dyn PlatformAuthenticator>,
    awaiting: AtomicBool,
}

impl AuthenticatorBridge {
    pub fn new(platform: Arc<dyn PlatformAuthenticator>) -> Self {
        Self {
            platform,
            awaiting: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.platform.is_available()
    }

    /// True while a device call is outstanding. UI feedback only; the
    /// transaction gate provides mutual exclusion.
    pub fn is_awaiting_device(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }

    /// Run the device operation matching the challenge's ceremony.
    ///
    /// Registration passes its single request with no excluded keys;
    /// authentication passes every outstanding request. Consumes the
    /// challenge.
    #[instrument(
        level = "info",
        skip(self, log, challenge),
        fields(kind = %challenge.kind(), requests = challenge.len(), timeout_ms = timeout.as_millis() as u64)
    )]
    pub async fn obtain_assertion(
        &self,
        log: &ActionLog,
        challenge: Challenge,
        timeout: Duration,
    ) -> Result<Assertion> {
        let kind = challenge.kind();
        let requests = challenge.into_requests();

        let _awaiting = AwaitingDevice::raise(&self.awaiting);
        log.warn(
            "Touch your security key",
            Some(json!({
                "operation": kind.device_operation(),
                "challenges": requests.len(),
                "timeoutMs": timeout.as_millis() as u64,
            })),
        );
        debug!("Waiting for device");

        let call = async {
            match kind {
                CeremonyKind::Registration => {
                    self.platform.register(requests, Vec::new(), timeout).await
                }
                CeremonyKind::Authentication => self.platform.sign(requests, timeout).await,
            }
        };

        let reply = match tokio::time::timeout(timeout, call).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!("Device did not answer in time");
                return Err(KeywardError::Timeout { after: timeout });
            }
        };

        let result = normalize_reply(reply);
        match &result {
            Ok(_) => info!("Device produced an assertion"),
            Err(e) => warn!(error = %e, "Device reply rejected"),
        }
        result
    }
}

/// Host without any security key support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableAuthenticator;

#[async_trait]
impl PlatformAuthenticator for UnavailableAuthenticator {
    fn is_available(&self) -> bool {
        false
    }

    async fn register(&self, _: Vec<Value>, _: Vec<KeyHandle>, _: Duration) -> Value {
        json!({ "errorCode": 3, "errorMessage": "no security key support on this host" })
    }

    async fn sign(&self, _: Vec<Value>, _: Duration) -> Value {
        json!({ "errorCode": 3, "errorMessage": "no security key support on this host" })
    }
}
