//! CLI command implementations.

pub mod ceremony;
pub mod list;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use keyward_core::{
    ActionEntry, EndpointLayout, Endpoints, MockAuthenticator, PlatformAuthenticator, Session,
    SessionConfig, Severity, UnavailableAuthenticator,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::GlobalArgs;

/// Build the session configuration from flags and environment.
pub fn build_config(args: &GlobalArgs) -> Result<SessionConfig> {
    let layout: EndpointLayout = args.layout.parse().context("Invalid --layout")?;
    let endpoints = Endpoints::parse(&args.server, layout).context("Invalid --server")?;

    let config = SessionConfig::new(endpoints)
        .with_device_timeout(Duration::from_secs(args.device_timeout))
        .with_http_timeout(Duration::from_secs(args.http_timeout));

    debug!(
        server = %config.endpoints.base(),
        layout = %layout,
        device_timeout_s = args.device_timeout,
        http_timeout_s = args.http_timeout,
        "Loaded configuration"
    );
    Ok(config)
}

/// Connect a session, backed by the mock key when `--mock` is set.
pub fn open_session(args: &GlobalArgs) -> Result<Session> {
    let config = build_config(args)?;

    let authenticator: Arc<dyn PlatformAuthenticator> = if args.mock {
        warn!("Using MOCK security key (replies are not real attestations!)");
        if !args.quiet {
            eprintln!(
                "{}",
                "Using MOCK security key (replies are not real attestations!)".yellow()
            );
        }
        let mock = MockAuthenticator::default();
        match args.mock_error {
            Some(code) => Arc::new(mock.with_error_code(code)),
            None => Arc::new(mock),
        }
    } else {
        Arc::new(UnavailableAuthenticator)
    };

    Session::connect(config, authenticator).context("Failed to create relying-party client")
}

/// Prints log entries as they are recorded.
pub struct LogPrinter {
    entries: broadcast::Receiver<ActionEntry>,
    enabled: bool,
}

impl LogPrinter {
    /// Print what is already in the log, then follow it.
    pub fn attach(session: &Session, args: &GlobalArgs) -> Self {
        let enabled = !args.quiet && !args.json;
        if enabled {
            for entry in session.log().entries().iter().rev() {
                print_entry(entry);
            }
        }
        Self {
            entries: session.log().subscribe(),
            enabled,
        }
    }

    /// Drive `work` to completion, printing entries as they arrive.
    pub async fn follow<F: std::future::Future>(&mut self, work: F) -> F::Output {
        tokio::pin!(work);
        let output = loop {
            tokio::select! {
                output = &mut work => break output,
                Ok(entry) = self.entries.recv() => {
                    if self.enabled {
                        print_entry(&entry);
                    }
                }
            }
        };
        self.drain();
        output
    }

    fn drain(&mut self) {
        while let Ok(entry) = self.entries.try_recv() {
            if self.enabled {
                print_entry(&entry);
            }
        }
    }
}

fn print_entry(entry: &ActionEntry) {
    let severity = format!("{:<4}", entry.severity.to_string().to_uppercase());
    let severity = match entry.severity {
        Severity::Pass => severity.green().bold(),
        Severity::Fail => severity.red().bold(),
        Severity::Warn => severity.yellow().bold(),
        Severity::Info => severity.blue(),
    };
    println!(
        "{} {} {}",
        entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        severity,
        entry.label
    );
}

/// Dump the whole log, newest first, when `--json` is set.
pub fn print_log_json(session: &Session, args: &GlobalArgs) -> Result<()> {
    if args.json {
        let json = serde_json::to_string_pretty(&session.log().entries())
            .context("Failed to serialize action log")?;
        println!("{json}");
    }
    Ok(())
}
