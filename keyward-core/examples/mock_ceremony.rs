//! Example running both ceremonies against in-memory collaborators.
//!
//! Run with: cargo run -p keyward-core --example mock_ceremony

use std::sync::Arc;

use keyward_core::{
    EndpointLayout, Endpoints, MockAuthenticator, MockRelyingParty, Session, SessionConfig,
};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("keyward_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Keyward Mock Ceremony Demo ===\n");

    let endpoints = match Endpoints::parse("https://rp.example", EndpointLayout::PerIdentity) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            eprintln!("Bad server URL: {}", e);
            return;
        }
    };

    let rp = MockRelyingParty::new()
        .with_get(
            "/register/alice",
            json!({"version": "U2F_V2", "challenge": "reg-1", "appId": "https://rp.example"}),
        )
        .with_post("/register/alice", json!("success"))
        .with_get(
            "/auth/alice",
            json!([{"version": "U2F_V2", "challenge": "auth-1", "keyHandle": "kh-1", "appId": "https://rp.example"}]),
        )
        .with_post("/auth/alice", json!("success"));

    let session = Session::new(
        SessionConfig::new(endpoints),
        Arc::new(rp),
        Arc::new(MockAuthenticator::default()),
    );

    for result in [
        session.register("alice").await,
        session.authenticate("alice").await,
    ] {
        match result {
            Ok(outcome) => println!("\nOutcome: {:?}", outcome),
            Err(e) => println!("\nFailed: {}", e),
        }
    }

    println!("\nAction log (newest first):");
    for entry in session.log().entries() {
        println!("   [{}] {}", entry.severity, entry.label);
    }
}
