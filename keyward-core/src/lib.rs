//! Keyward Core - single-flight U2F ceremonies
//!
//! This crate drives the client side of a U2F challenge/response handshake
//! between a relying-party server and a hardware security key.
//!
//! # Features
//!
//! - One transaction in flight at a time, enforced by an atomic gate
//! - Registration and authentication as fetch → touch → submit pipelines
//! - Device error codes and timeouts classified before anything is submitted
//! - An observable, newest-first action log of every step
//! - Fixed or identity-parameterized endpoint layouts
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_core::{MockAuthenticator, Outcome, Session, SessionConfig};
//!
//! # async fn example() -> keyward_core::Result<()> {
//! let config = SessionConfig::from_env()?;
//!
//! // Use the mock authenticator for testing (no real security key involved)
//! let session = Session::connect(config, Arc::new(MockAuthenticator::default()))?;
//!
//! match session.register("alice").await? {
//!     Outcome::Completed { ack, .. } => println!("Registered: {}", ack.as_json()),
//!     Outcome::Busy => println!("Another ceremony is running"),
//! }
//!
//! for entry in session.log().entries() {
//!     println!("[{}] {}", entry.severity, entry.label);
//! }
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod ceremony;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod gate;
pub mod log;
pub mod transport;

// Re-export main types for convenience
pub use authenticator::{
    normalize_reply, Assertion, AuthenticatorBridge, KeyHandle, MockAuthenticator,
    PlatformAuthenticator, UnavailableAuthenticator,
};
pub use ceremony::{CeremonyKind, CeremonyPhase, ListOutcome, Outcome, Session};
pub use config::SessionConfig;
pub use endpoints::{EndpointLayout, Endpoints};
pub use error::{DeviceErrorCode, KeywardError, Result, TransportError, TransportErrorKind};
pub use gate::{GateGuard, TransactionGate, TransactionState};
pub use log::{ActionEntry, ActionLog, Severity};
pub use transport::{
    Ack, Challenge, ChallengeTransport, KeyDescriptor, MockRelyingParty, RelyingPartyClient,
};

#[cfg(feature = "network")]
pub use transport::HttpRelyingParty;
