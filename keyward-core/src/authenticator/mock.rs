//! Mock authenticator for testing and offline demos.
//!
//! WARNING: replies are derived deterministically from a seed with SHA3.
//! They are shaped like U2F replies but carry no real attestation or
//! signature.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use serde_json::{json, Value};
use sha3::{Digest, Sha3_256};
use tokio::sync::Notify;

use super::{KeyHandle, PlatformAuthenticator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    Register,
    Sign,
}

/// One call the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCall {
    pub operation: DeviceOperation,
    pub requests: Vec<Value>,
    pub registered_keys: Vec<KeyHandle>,
    pub timeout: Duration,
}

pub struct MockAuthenticator {
    seed: u64,
    available: bool,
    error_code: Option<u32>,
    reply: Option<Value>,
    hold: Option<Arc<Notify>>,
    silent: bool,
    calls: Mutex<Vec<DeviceCall>>,
}

impl MockAuthenticator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            available: true,
            error_code: None,
            reply: None,
            hold: None,
            silent: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with default seed for simple tests.
    pub fn default_test() -> Self {
        Self::new(0xDEADBEEF_CAFEBABE)
    }

    /// Report no security key capability.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Answer every call with `{"errorCode": code}`.
    pub fn with_error_code(mut self, code: u32) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Answer every call with a fixed reply.
    pub fn with_reply(mut self, reply: Value) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Hold each reply until `release` is notified (the "touch").
    pub fn held_until(mut self, release: Arc<Notify>) -> Self {
        self.hold = Some(release);
        self
    }

    /// Never answer, as if nobody touches the key.
    pub fn never_replies(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Key handle this mock hands out on registration.
    pub fn key_handle(&self) -> KeyHandle {
        BASE64URL.encode(&self.digest(&[b"key-handle".as_slice()])[..16])
    }

    fn digest(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(b"keyward-mock-authenticator");
        for part in parts {
            hasher.update(part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    async fn respond(&self, call: DeviceCall) -> Value {
        let operation = call.operation;
        let first = call.requests.first().cloned().unwrap_or(Value::Null);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        if self.silent {
            std::future::pending::<()>().await;
        }
        if let Some(release) = &self.hold {
            release.notified().await;
        }

        if let Some(code) = self.error_code {
            return json!({ "errorCode": code });
        }
        if let Some(reply) = &self.reply {
            return reply.clone();
        }

        let challenge = first.get("challenge").and_then(Value::as_str).unwrap_or_default();
        let origin = first.get("appId").and_then(Value::as_str).unwrap_or_default();

        match operation {
            DeviceOperation::Register => {
                let client_data = json!({
                    "typ": "navigator.id.finishEnrollment",
                    "challenge": challenge,
                    "origin": origin,
                });
                let mut registration = self.digest(&[b"key-handle".as_slice()])[..16].to_vec();
                registration.extend_from_slice(&self.digest(&[b"register".as_slice(), challenge.as_bytes()]));
                json!({
                    "version": "U2F_V2",
                    "registrationData": BASE64URL.encode(registration),
                    "clientData": BASE64URL.encode(client_data.to_string()),
                })
            }
            DeviceOperation::Sign => {
                let client_data = json!({
                    "typ": "navigator.id.getAssertion",
                    "challenge": challenge,
                    "origin": origin,
                });
                let key_handle = first
                    .get("keyHandle")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| self.key_handle());
                json!({
                    "keyHandle": key_handle,
                    "signatureData": BASE64URL.encode(self.digest(&[b"sign".as_slice(), challenge.as_bytes()])),
                    "clientData": BASE64URL.encode(client_data.to_string()),
                })
            }
        }
    }
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::default_test()
    }
}

#[async_trait]
impl PlatformAuthenticator for MockAuthenticator {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn register(
        &self,
        requests: Vec<Value>,
        registered_keys: Vec<KeyHandle>,
        timeout: Duration,
    ) -> Value {
        self.respond(DeviceCall {
            operation: DeviceOperation::Register,
            requests,
            registered_keys,
            timeout,
        })
        .await
    }

    async fn sign(&self, requests: Vec<Value>, timeout: Duration) -> Value {
        self.respond(DeviceCall {
            operation: DeviceOperation::Sign,
            requests,
            registered_keys: Vec::new(),
            timeout,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_deterministic() {
        let a = MockAuthenticator::new(42);
        let b = MockAuthenticator::new(42);
        let request = vec![json!({"challenge": "c1", "appId": "https://rp.example"})];

        let ra = a.register(request.clone(), vec![], Duration::from_secs(1)).await;
        let rb = b.register(request, vec![], Duration::from_secs(1)).await;
        assert_eq!(ra, rb, "Same seed should produce same reply");
        assert_eq!(ra["version"], "U2F_V2");
    }

    #[tokio::test]
    async fn test_mock_different_seeds() {
        let request = vec![json!({"challenge": "c1", "keyHandle": "k1"})];
        let ra = MockAuthenticator::new(1).sign(request.clone(), Duration::from_secs(1)).await;
        let rb = MockAuthenticator::new(2).sign(request, Duration::from_secs(1)).await;
        assert_ne!(ra["signatureData"], rb["signatureData"]);
        assert_eq!(ra["keyHandle"], "k1");
    }

    #[tokio::test]
    async fn test_client_data_echoes_challenge() {
        let device = MockAuthenticator::default();
        let reply = device
            .sign(vec![json!({"challenge": "xyz", "appId": "https://rp.example"})], Duration::from_secs(1))
            .await;
        let client_data = BASE64URL
            .decode(reply["clientData"].as_str().unwrap())
            .unwrap();
        let client_data: Value = serde_json::from_slice(&client_data).unwrap();
        assert_eq!(client_data["challenge"], "xyz");
        assert_eq!(client_data["typ"], "navigator.id.getAssertion");
        assert_eq!(reply["keyHandle"], device.key_handle());
    }

    #[tokio::test]
    async fn test_scripted_error_code_and_call_record() {
        let device = MockAuthenticator::default().with_error_code(4);
        let reply = device.sign(vec![json!({})], Duration::from_secs(3)).await;
        assert_eq!(reply, json!({"errorCode": 4}));

        let calls = device.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, DeviceOperation::Sign);
        assert_eq!(calls[0].timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unavailable() {
        assert!(MockAuthenticator::default().is_available());
        assert!(!MockAuthenticator::default().unavailable().is_available());
    }
}
