//! Scripted relying party for tests and offline demos.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::RelyingPartyClient;
use crate::error::{TransportError, TransportErrorKind};

type Reply = Result<Value, (TransportErrorKind, String)>;

/// A request the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
}

/// In-memory relying party keyed by `(method, path)`.
///
/// Every request is recorded. Unscripted routes answer with HTTP 404.
#[derive(Default)]
pub struct MockRelyingParty {
    routes: HashMap<(&'static str, String), Reply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockRelyingParty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_get(mut self, path: &str, reply: Value) -> Self {
        self.routes.insert(("GET", path.to_string()), Ok(reply));
        self
    }

    pub fn with_post(mut self, path: &str, reply: Value) -> Self {
        self.routes.insert(("POST", path.to_string()), Ok(reply));
        self
    }

    pub fn with_get_failure(
        mut self,
        path: &str,
        kind: TransportErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        self.routes
            .insert(("GET", path.to_string()), Err((kind, detail.into())));
        self
    }

    pub fn with_post_failure(
        mut self,
        path: &str,
        kind: TransportErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        self.routes
            .insert(("POST", path.to_string()), Err((kind, detail.into())));
        self
    }

    /// Everything received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests received for `method`.
    pub fn count(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn answer(
        &self,
        method: &'static str,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method,
                url: url.to_string(),
                body: body.cloned(),
            });

        match self.routes.get(&(method, url.path().to_string())) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err((kind, detail))) => {
                Err(TransportError::new(method, url.as_str(), *kind, detail.clone()))
            }
            None => Err(TransportError::new(
                method,
                url.as_str(),
                TransportErrorKind::Status(404),
                "Not Found",
            )),
        }
    }
}

#[async_trait]
impl RelyingPartyClient for MockRelyingParty {
    async fn get_json(&self, url: &Url) -> Result<Value, TransportError> {
        self.answer("GET", url, None)
    }

    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError> {
        self.answer("POST", url, Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_routes() {
        let rp = MockRelyingParty::new()
            .with_get("/register/alice", json!({"challenge": "c1"}))
            .with_post_failure("/register/alice", TransportErrorKind::Status(400), "bad");

        let url = Url::parse("https://rp.example/register/alice").unwrap();
        assert_eq!(rp.get_json(&url).await.unwrap()["challenge"], "c1");

        let err = rp.post_json(&url, &json!({})).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Status(400));
        assert_eq!(rp.count("GET"), 1);
        assert_eq!(rp.count("POST"), 1);
    }

    #[tokio::test]
    async fn test_unscripted_route_is_404() {
        let rp = MockRelyingParty::new();
        let url = Url::parse("https://rp.example/list/alice").unwrap();
        let err = rp.get_json(&url).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Status(404));
        assert_eq!(rp.requests()[0].url, "https://rp.example/list/alice");
    }
}
