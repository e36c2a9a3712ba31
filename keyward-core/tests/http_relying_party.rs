//! End-to-end ceremonies over real HTTP against a small axum relying party.

#![cfg(feature = "network")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use keyward_core::{
    CeremonyKind, EndpointLayout, Endpoints, KeywardError, ListOutcome, MockAuthenticator,
    Outcome, Session, SessionConfig, Severity, TransportErrorKind,
};
use serde_json::{json, Value};

const APP_ID: &str = "http://localhost:3483";

/// Registered key handles per identity.
#[derive(Default)]
struct RelyingParty {
    keys: Mutex<HashMap<String, Vec<String>>>,
}

type Shared = Arc<RelyingParty>;

async fn register_challenge(Path(identity): Path<String>) -> Json<Value> {
    Json(json!({
        "version": "U2F_V2",
        "challenge": format!("reg-{identity}"),
        "appId": APP_ID,
    }))
}

async fn register_response(
    State(rp): State<Shared>,
    Path(identity): Path<String>,
    Json(reply): Json<Value>,
) -> Response {
    if reply.get("registrationData").and_then(Value::as_str).is_none() {
        return (StatusCode::BAD_REQUEST, "missing registrationData").into_response();
    }
    let mut keys = rp.keys.lock().unwrap();
    let handles = keys.entry(identity).or_default();
    handles.push(format!("kh-{}", handles.len() + 1));
    "success".into_response()
}

async fn auth_challenge(State(rp): State<Shared>, Path(identity): Path<String>) -> Response {
    let keys = rp.keys.lock().unwrap();
    match keys.get(&identity) {
        Some(handles) if !handles.is_empty() => {
            let challenges: Vec<Value> = handles
                .iter()
                .map(|kh| {
                    json!({
                        "version": "U2F_V2",
                        "challenge": format!("auth-{identity}"),
                        "keyHandle": kh,
                        "appId": APP_ID,
                    })
                })
                .collect();
            Json(Value::Array(challenges)).into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "no keys registered").into_response(),
    }
}

async fn auth_response(
    State(rp): State<Shared>,
    Path(identity): Path<String>,
    Json(reply): Json<Value>,
) -> Response {
    let keys = rp.keys.lock().unwrap();
    let known = keys
        .get(&identity)
        .zip(reply.get("keyHandle").and_then(Value::as_str))
        .is_some_and(|(handles, kh)| handles.iter().any(|h| h == kh));
    if known {
        "success".into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "unknown key handle").into_response()
    }
}

async fn list_keys(State(rp): State<Shared>, Path(identity): Path<String>) -> Json<Value> {
    let keys = rp.keys.lock().unwrap();
    let listed: Vec<Value> = keys
        .get(&identity)
        .map(|handles| {
            handles
                .iter()
                .map(|kh| json!({ "KeyHandle": kh, "Counter": 0 }))
                .collect()
        })
        .unwrap_or_default();
    Json(Value::Array(listed))
}

async fn spawn_relying_party() -> SocketAddr {
    let app = Router::new()
        .route("/register/{identity}", get(register_challenge).post(register_response))
        .route("/auth/{identity}", get(auth_challenge).post(auth_response))
        .route("/list/{identity}", get(list_keys))
        .with_state(Shared::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> SessionConfig {
    SessionConfig::new(
        Endpoints::parse(&format!("http://{addr}"), EndpointLayout::PerIdentity).unwrap(),
    )
}

#[tokio::test]
async fn test_register_authenticate_list_over_http() {
    let addr = spawn_relying_party().await;
    let session = Session::connect(config(addr), Arc::new(MockAuthenticator::default())).unwrap();

    let registered = session.register("alice").await.unwrap();
    match registered {
        Outcome::Completed { kind, ack } => {
            assert_eq!(kind, CeremonyKind::Registration);
            assert_eq!(ack.as_json(), &json!("success"));
        }
        Outcome::Busy => panic!("nothing else was running"),
    }

    let authenticated = session.authenticate("alice").await.unwrap();
    assert!(!authenticated.is_busy());
    assert_eq!(session.log().latest().unwrap().label, "Authenticated");

    match session.list_keys("alice").await.unwrap() {
        ListOutcome::Keys(keys) => {
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0]["KeyHandle"], "kh-1");
        }
        ListOutcome::Busy => panic!("gate should be free"),
    }

    assert_eq!(session.log().count(Severity::Fail), 0);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_http_error_status_is_classified() {
    let addr = spawn_relying_party().await;
    let session = Session::connect(config(addr), Arc::new(MockAuthenticator::default())).unwrap();

    // bob never registered, so the server refuses to issue a challenge.
    let err = session.authenticate("bob").await.unwrap_err();
    match err {
        KeywardError::Transport(err) => {
            assert_eq!(err.kind, TransportErrorKind::Status(400));
            assert_eq!(err.method, "GET");
            assert!(err.detail.contains("no keys registered"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(session.log().count(Severity::Fail), 1);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_identity_is_a_single_path_segment() {
    let addr = spawn_relying_party().await;
    let session = Session::connect(config(addr), Arc::new(MockAuthenticator::default())).unwrap();

    session.register("carol/../admin").await.unwrap();

    match session.list_keys("carol/../admin").await.unwrap() {
        ListOutcome::Keys(keys) => assert_eq!(keys.len(), 1),
        ListOutcome::Busy => panic!("gate should be free"),
    }
    match session.list_keys("admin").await.unwrap() {
        ListOutcome::Keys(keys) => assert!(keys.is_empty()),
        ListOutcome::Busy => panic!("gate should be free"),
    }
}
