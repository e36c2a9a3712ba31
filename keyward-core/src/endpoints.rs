//! Relying-party endpoint layout.
//!
//! Two naming conventions are in use in the wild:
//!
//! | Operation | `Fixed` | `PerIdentity` |
//! |---|---|---|
//! | registration challenge (GET) | `/registerRequest` | `/register/{identity}` |
//! | registration response (POST) | `/registerResponse` | `/register/{identity}` |
//! | authentication challenge (GET) | `/signRequest` | `/auth/{identity}` |
//! | authentication response (POST) | `/signResponse` | `/auth/{identity}` |
//! | registered keys (GET) | `/list/{identity}` | `/list/{identity}` |

use std::str::FromStr;

use url::Url;

use crate::ceremony::CeremonyKind;
use crate::error::{KeywardError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointLayout {
    /// Fixed paths; identity is carried by the server-side session.
    Fixed,
    /// Identity appended as the last path segment.
    #[default]
    PerIdentity,
}

impl FromStr for EndpointLayout {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "per-identity" | "per_identity" | "identity" => Ok(Self::PerIdentity),
            other => Err(KeywardError::Config(format!(
                "unknown endpoint layout '{other}' (expected 'fixed' or 'per-identity')"
            ))),
        }
    }
}

impl std::fmt::Display for EndpointLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::PerIdentity => write!(f, "per-identity"),
        }
    }
}

/// Resolves ceremony URLs against a relying-party base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    layout: EndpointLayout,
}

impl Endpoints {
    pub fn new(base: Url, layout: EndpointLayout) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(KeywardError::Config(format!(
                "server URL '{base}' cannot carry a path"
            )));
        }
        Ok(Self { base, layout })
    }

    pub fn parse(base: &str, layout: EndpointLayout) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| KeywardError::Config(format!("invalid server URL '{base}': {e}")))?;
        Self::new(base, layout)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn layout(&self) -> EndpointLayout {
        self.layout
    }

    /// GET target for a ceremony's challenge.
    pub fn challenge_url(&self, kind: CeremonyKind, identity: &str) -> Result<Url> {
        match (self.layout, kind) {
            (EndpointLayout::Fixed, CeremonyKind::Registration) => self.join(&["registerRequest"]),
            (EndpointLayout::Fixed, CeremonyKind::Authentication) => self.join(&["signRequest"]),
            (EndpointLayout::PerIdentity, _) => self.join(&[kind.path_prefix(), identity]),
        }
    }

    /// POST target for a ceremony's assertion.
    pub fn response_url(&self, kind: CeremonyKind, identity: &str) -> Result<Url> {
        match (self.layout, kind) {
            (EndpointLayout::Fixed, CeremonyKind::Registration) => self.join(&["registerResponse"]),
            (EndpointLayout::Fixed, CeremonyKind::Authentication) => self.join(&["signResponse"]),
            (EndpointLayout::PerIdentity, _) => self.join(&[kind.path_prefix(), identity]),
        }
    }

    pub fn list_url(&self, identity: &str) -> Result<Url> {
        self.join(&["list", identity])
    }

    /// Append path segments, percent-encoding each one.
    fn join(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| KeywardError::Config(format!("server URL '{}' cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
