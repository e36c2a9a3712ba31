//! Relying-party transport.
//!
//! [`ChallengeTransport`] performs the two ceremony requests (fetch a
//! challenge, submit an assertion) plus key listing. Every call requires a
//! [`GateGuard`], logs an `info` entry before dispatch, and on failure logs
//! exactly one `fail` entry carrying the attempted URL and raw detail.
//!
//! The HTTP work itself sits behind [`RelyingPartyClient`]:
//!
//! - [`HttpRelyingParty`] - reqwest-backed client (`network` feature)
//! - [`MockRelyingParty`] - scripted replies for tests and demos

#[cfg(feature = "network")]
mod http;
mod mock;

#[cfg(feature = "network")]
pub use http::HttpRelyingParty;
pub use mock::{MockRelyingParty, RecordedRequest};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::authenticator::Assertion;
use crate::ceremony::CeremonyKind;
use crate::endpoints::Endpoints;
use crate::error::{KeywardError, Result, TransportError, TransportErrorKind};
use crate::gate::GateGuard;
use crate::log::ActionLog;

/// Opaque description of a registered key, as listed by the relying party.
pub type KeyDescriptor = Value;

/// HTTP access to the relying party.
///
/// Implementations classify their own failures into [`TransportError`]
/// values; they do not log to the [`ActionLog`].
#[async_trait]
pub trait RelyingPartyClient: Send + Sync {
    /// GET `url` and decode the JSON body.
    async fn get_json(&self, url: &Url) -> std::result::Result<Value, TransportError>;

    /// POST `body` as JSON to `url` and return the decoded reply.
    async fn post_json(
        &self,
        url: &Url,
        body: &Value,
    ) -> std::result::Result<Value, TransportError>;
}

/// Server-issued challenge for one ceremony.
///
/// Holds one request for registration, or one-or-many for authentication
/// (one per key registered to the identity). Not `Clone`: a challenge is
/// handed to exactly one authenticator call.
#[derive(Debug, PartialEq)]
pub struct Challenge {
    kind: CeremonyKind,
    requests: Vec<Value>,
}

impl Challenge {
    /// Validate the shape of a challenge payload.
    ///
    /// Accepts a single JSON object or an array of objects. Registration
    /// takes exactly one request; authentication at least one.
    pub fn from_json(kind: CeremonyKind, payload: Value) -> std::result::Result<Self, String> {
        let requests = match payload {
            Value::Object(_) => vec![payload],
            Value::Array(items) => items,
            other => return Err(format!("expected a JSON object or array, got {other}")),
        };

        if let Some(bad) = requests.iter().find(|r| !r.is_object()) {
            return Err(format!("challenge entries must be JSON objects, got {bad}"));
        }

        match (kind, requests.len()) {
            (_, 0) => Err(format!("server returned no {kind} challenges")),
            (CeremonyKind::Registration, n) if n > 1 => Err(format!(
                "expected a single registration challenge, got {n}"
            )),
            _ => Ok(Self { kind, requests }),
        }
    }

    pub fn kind(&self) -> CeremonyKind {
        self.kind
    }

    pub fn requests(&self) -> &[Value] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn into_requests(self) -> Vec<Value> {
        self.requests
    }
}

/// Server acknowledgement of a submitted assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack(pub Value);

impl Ack {
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Gated, logged access to the relying-party endpoints.
pub struct ChallengeTransport {
    client: Arc<dyn RelyingPartyClient>,
    endpoints: Endpoints,
}

impl ChallengeTransport {
    pub fn new(client: Arc<dyn RelyingPartyClient>, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// GET the ceremony's challenge endpoint.
    #[instrument(level = "debug", skip(self, _gate, log), fields(kind = %kind))]
    pub async fn fetch_challenge(
        &self,
        _gate: &GateGuard<'_>,
        log: &ActionLog,
        kind: CeremonyKind,
        identity: &str,
    ) -> Result<Challenge> {
        let url = self.resolve(log, "GET", self.endpoints.challenge_url(kind, identity))?;
        let payload = self.get(log, &url).await?;

        let challenge = Challenge::from_json(kind, payload.clone()).map_err(|detail| {
            let err = TransportError::malformed("GET", url.as_str(), detail);
            Self::log_failure(log, &url, &err);
            KeywardError::Transport(err)
        })?;

        log.info(
            "Challenge received",
            Some(json!({ "ceremony": kind.to_string(), "count": challenge.len(), "challenge": payload })),
        );
        Ok(challenge)
    }

    /// POST an assertion to the ceremony's response endpoint.
    ///
    /// The assertion type cannot carry an authenticator error code, so an
    /// errored device reply never reaches this point.
    #[instrument(level = "debug", skip(self, _gate, log, assertion), fields(kind = %kind))]
    pub async fn submit_response(
        &self,
        _gate: &GateGuard<'_>,
        log: &ActionLog,
        kind: CeremonyKind,
        identity: &str,
        assertion: &Assertion,
    ) -> Result<Ack> {
        let url = self.resolve(log, "POST", self.endpoints.response_url(kind, identity))?;
        let reply = self.post(log, &url, assertion.as_json()).await?;

        log.info(
            "Response accepted",
            Some(json!({ "ceremony": kind.to_string(), "ack": reply })),
        );
        Ok(Ack(reply))
    }

    /// GET the keys registered to `identity`.
    #[instrument(level = "debug", skip(self, _gate, log))]
    pub async fn list_keys(
        &self,
        _gate: &GateGuard<'_>,
        log: &ActionLog,
        identity: &str,
    ) -> Result<Vec<KeyDescriptor>> {
        let url = self.resolve(log, "GET", self.endpoints.list_url(identity))?;
        match self.get(log, &url).await? {
            Value::Array(keys) => Ok(keys),
            // Some servers encode an empty Go slice as null.
            Value::Null => Ok(Vec::new()),
            other => {
                let err = TransportError::malformed(
                    "GET",
                    url.as_str(),
                    format!("expected a JSON array of keys, got {other}"),
                );
                Self::log_failure(log, &url, &err);
                Err(err.into())
            }
        }
    }

    async fn get(&self, log: &ActionLog, url: &Url) -> std::result::Result<Value, TransportError> {
        Self::log_dispatch(log, "GET", url, None);
        let start = Instant::now();

        let result = self.client.get_json(url).await;
        Self::finish(log, url, start, result)
    }

    async fn post(
        &self,
        log: &ActionLog,
        url: &Url,
        body: &Value,
    ) -> std::result::Result<Value, TransportError> {
        Self::log_dispatch(log, "POST", url, Some(body));
        let start = Instant::now();

        let result = self.client.post_json(url, body).await;
        Self::finish(log, url, start, result)
    }

    fn finish(
        log: &ActionLog,
        url: &Url,
        start: Instant,
        result: std::result::Result<Value, TransportError>,
    ) -> std::result::Result<Value, TransportError> {
        let latency_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(url = %url, latency_ms, "Request completed"),
            Err(err) => Self::log_failure(log, url, err),
        }
        result
    }

    fn resolve(
        &self,
        log: &ActionLog,
        method: &'static str,
        url: Result<Url>,
    ) -> Result<Url> {
        url.inspect_err(|err| {
            log.fail(
                format!("{method} request not sent"),
                Some(json!({ "server": self.endpoints.base().as_str(), "detail": err.to_string() })),
            );
        })
    }

    fn log_dispatch(log: &ActionLog, method: &str, url: &Url, payload: Option<&Value>) {
        log.info(
            format!("{method} {}", url.path()),
            Some(json!({ "method": method, "url": url.as_str(), "payload": payload })),
        );
    }

    fn log_failure(log: &ActionLog, url: &Url, err: &TransportError) {
        let status = match err.kind {
            TransportErrorKind::Status(status) => Some(status),
            _ => None,
        };
        log.fail(
            format!("{} {} failed", err.method, url.path()),
            Some(json!({
                "url": url.as_str(),
                "kind": err.kind.to_string(),
                "status": status,
                "detail": err.detail,
            })),
        );
    }
}
