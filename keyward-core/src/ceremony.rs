//! Registration and authentication ceremonies.
//!
//! A [`Session`] owns the action log, the transaction gate, the transport
//! and the authenticator bridge for its whole life. Each ceremony runs
//!
//! ```text
//! Idle → Dispatching → ChallengeReceived → AwaitingDevice → ResponseSubmitted → Completed
//! ```
//!
//! with `Failed` reachable from any non-terminal phase. A trigger that
//! finds the gate taken is dropped with an `info` entry and never enters
//! `Dispatching`. A ceremony whose future is dropped mid-flight ends
//! `Failed` with a "Ceremony cancelled" entry.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::authenticator::{AuthenticatorBridge, PlatformAuthenticator};
use crate::config::SessionConfig;
use crate::error::{KeywardError, Result};
use crate::gate::{GateGuard, TransactionGate};
use crate::log::ActionLog;
use crate::transport::{Ack, ChallengeTransport, KeyDescriptor, RelyingPartyClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    /// Label of the terminal `pass` entry.
    pub fn completed_label(&self) -> &'static str {
        match self {
            Self::Registration => "Registered",
            Self::Authentication => "Authenticated",
        }
    }

    /// Path segment used by identity-parameterized endpoints.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            Self::Registration => "register",
            Self::Authentication => "auth",
        }
    }

    /// Name of the platform authenticator call.
    pub fn device_operation(&self) -> &'static str {
        match self {
            Self::Registration => "register",
            Self::Authentication => "sign",
        }
    }
}

impl std::fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => write!(f, "registration"),
            Self::Authentication => write!(f, "authentication"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CeremonyPhase {
    #[default]
    Idle,
    Dispatching,
    ChallengeReceived,
    AwaitingDevice,
    ResponseSubmitted,
    Completed,
    Failed,
}

impl CeremonyPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a ceremony occupying this phase holds the gate.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Dispatching
                | Self::ChallengeReceived
                | Self::AwaitingDevice
                | Self::ResponseSubmitted
        )
    }
}

/// Result of a ceremony trigger that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { kind: CeremonyKind, ack: Ack },
    /// Another transaction held the gate; nothing was started.
    Busy,
}

impl Outcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    Keys(Vec<KeyDescriptor>),
    Busy,
}

/// Capacity of the phase transition channel. A ceremony makes at most six
/// transitions.
const TRANSITION_CAPACITY: usize = 16;

/// Marks the phase `Failed` unless the ceremony reached a terminal phase
/// first. An exit whose outcome was never logged (a dropped future, a
/// panic) gets its single `fail` entry here.
struct PhaseGuard<'a> {
    session: &'a Session,
    kind: CeremonyKind,
    settled: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(session: &'a Session, kind: CeremonyKind) -> Self {
        Self {
            session,
            kind,
            settled: false,
        }
    }

    /// The outcome, success or failure, is already in the log.
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let phase = self.session.phase();
        if phase.is_terminal() {
            return;
        }
        if !self.settled {
            warn!(?phase, "Ceremony abandoned before completion");
            self.session.log.fail(
                "Ceremony cancelled",
                Some(json!({ "ceremony": self.kind.to_string(), "phase": format!("{phase:?}") })),
            );
        }
        self.session.set_phase(CeremonyPhase::Failed);
    }
}

/// One operator session against one relying party.
pub struct Session {
    config: SessionConfig,
    log: ActionLog,
    gate: TransactionGate,
    transport: ChallengeTransport,
    bridge: AuthenticatorBridge,
    phase: watch::Sender<CeremonyPhase>,
    transitions: broadcast::Sender<CeremonyPhase>,
}

impl Session {
    /// Create a session. A missing authenticator is reported here, once.
    pub fn new(
        config: SessionConfig,
        client: Arc<dyn RelyingPartyClient>,
        authenticator: Arc<dyn PlatformAuthenticator>,
    ) -> Self {
        let log = ActionLog::new();
        let bridge = AuthenticatorBridge::new(authenticator);
        if !bridge.is_available() {
            warn!("No platform authenticator available");
            log.fail(
                "Security key support unavailable",
                Some(json!({ "detail": KeywardError::AuthenticatorUnavailable.to_string() })),
            );
        }

        let (phase, _) = watch::channel(CeremonyPhase::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            transport: ChallengeTransport::new(client, config.endpoints.clone()),
            config,
            log,
            gate: TransactionGate::new(),
            bridge,
            phase,
            transitions,
        }
    }

    /// Create a session talking HTTP to the configured relying party.
    #[cfg(feature = "network")]
    pub fn connect(
        config: SessionConfig,
        authenticator: Arc<dyn PlatformAuthenticator>,
    ) -> Result<Self> {
        let client = crate::transport::HttpRelyingParty::new(config.http_timeout)?;
        Ok(Self::new(config, Arc::new(client), authenticator))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn is_awaiting_device(&self) -> bool {
        self.bridge.is_awaiting_device()
    }

    pub fn is_authenticator_available(&self) -> bool {
        self.bridge.is_available()
    }

    /// Phase of the current or most recent ceremony.
    pub fn phase(&self) -> CeremonyPhase {
        *self.phase.borrow()
    }

    /// Follow the current phase. Phases set back to back (such as
    /// `ChallengeReceived` then `AwaitingDevice`) may be coalesced; use
    /// [`Session::subscribe_transitions`] to see every step.
    pub fn subscribe_phase(&self) -> watch::Receiver<CeremonyPhase> {
        self.phase.subscribe()
    }

    /// Receive every phase transition, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<CeremonyPhase> {
        self.transitions.subscribe()
    }

    pub async fn register(&self, identity: &str) -> Result<Outcome> {
        self.start(CeremonyKind::Registration, identity).await
    }

    pub async fn authenticate(&self, identity: &str) -> Result<Outcome> {
        self.start(CeremonyKind::Authentication, identity).await
    }

    /// Run one ceremony end to end.
    ///
    /// Returns `Ok(Outcome::Busy)` when another transaction is in flight.
    /// Every error return has produced exactly one `fail` log entry, except
    /// [`KeywardError::AuthenticatorUnavailable`], which was reported when
    /// the session was created.
    #[instrument(level = "info", skip(self), fields(kind = %kind))]
    pub async fn start(&self, kind: CeremonyKind, identity: &str) -> Result<Outcome> {
        let identity = self.require_identity(identity, &kind.to_string())?;
        if !self.bridge.is_available() {
            return Err(KeywardError::AuthenticatorUnavailable);
        }

        let Some(gate) = self.gate.try_enter() else {
            info!("Transaction in flight, trigger ignored");
            self.log.info(
                format!("Busy, {kind} request ignored"),
                Some(json!({ "ceremony": kind.to_string(), "identity": identity })),
            );
            return Ok(Outcome::Busy);
        };
        // Declared after the gate so it drops first: the phase is terminal
        // before the gate reopens.
        let mut phase = PhaseGuard::new(self, kind);

        let result = self.run(&gate, kind, identity).await;
        // Failures inside `run` are logged where they happen.
        phase.settle();
        let ack = result?;

        self.set_phase(CeremonyPhase::Completed);
        self.log.pass(
            kind.completed_label(),
            Some(json!({ "identity": identity, "ack": ack.as_json() })),
        );
        info!("Ceremony completed");
        Ok(Outcome::Completed { kind, ack })
    }

    async fn run(&self, gate: &GateGuard<'_>, kind: CeremonyKind, identity: &str) -> Result<Ack> {
        self.set_phase(CeremonyPhase::Dispatching);
        let challenge = self
            .transport
            .fetch_challenge(gate, &self.log, kind, identity)
            .await?;
        self.set_phase(CeremonyPhase::ChallengeReceived);

        self.set_phase(CeremonyPhase::AwaitingDevice);
        let assertion = self
            .bridge
            .obtain_assertion(&self.log, challenge, self.config.device_timeout)
            .await
            .inspect_err(|err| self.log_device_failure(kind, err))?;

        let ack = self
            .transport
            .submit_response(gate, &self.log, kind, identity, &assertion)
            .await?;
        self.set_phase(CeremonyPhase::ResponseSubmitted);
        Ok(ack)
    }

    /// List keys registered to `identity`. Shares the gate with ceremonies.
    #[instrument(level = "info", skip(self))]
    pub async fn list_keys(&self, identity: &str) -> Result<ListOutcome> {
        let identity = self.require_identity(identity, "list")?;

        let Some(gate) = self.gate.try_enter() else {
            self.log.info(
                "Busy, key listing ignored",
                Some(json!({ "identity": identity })),
            );
            return Ok(ListOutcome::Busy);
        };

        let keys = self.transport.list_keys(&gate, &self.log, identity).await?;
        self.log.info(
            format!("{} registered key(s)", keys.len()),
            Some(json!({ "identity": identity })),
        );
        Ok(ListOutcome::Keys(keys))
    }

    fn require_identity<'a>(&self, identity: &'a str, operation: &str) -> Result<&'a str> {
        let identity = identity.trim();
        if identity.is_empty() {
            self.log.fail(
                "No user identity provided",
                Some(json!({ "operation": operation })),
            );
            return Err(KeywardError::MissingIdentity);
        }
        Ok(identity)
    }

    fn log_device_failure(&self, kind: CeremonyKind, err: &KeywardError) {
        let (label, detail) = match err {
            KeywardError::Authenticator { code, message } => (
                format!("Security key error {}", code.code()),
                json!({
                    "ceremony": kind.to_string(),
                    "errorCode": code.code(),
                    "error": code.to_string(),
                    "message": message,
                }),
            ),
            KeywardError::Timeout { after } => (
                "Timed out waiting for security key".to_string(),
                json!({ "ceremony": kind.to_string(), "timeout": true, "afterMs": after.as_millis() as u64 }),
            ),
            other => (
                "Security key reply rejected".to_string(),
                json!({ "ceremony": kind.to_string(), "detail": other.to_string() }),
            ),
        };
        self.log.fail(label, Some(detail));
    }

    fn set_phase(&self, phase: CeremonyPhase) {
        tracing::debug!(?phase, "Ceremony phase");
        self.phase.send_replace(phase);
        // No subscribers is fine.
        let _ = self.transitions.send(phase);
    }
}
