//! List command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use keyward_core::ListOutcome;
use serde_json::Value;

use super::{open_session, print_log_json, LogPrinter};
use crate::exit_codes::TransactionBusy;
use crate::GlobalArgs;

/// Execute the list command.
pub async fn execute(args: &GlobalArgs, identity: String) -> Result<()> {
    let session = open_session(args)?;
    let mut printer = LogPrinter::attach(&session, args);

    let result = printer.follow(session.list_keys(&identity)).await;
    print_log_json(&session, args)?;

    let keys = match result.context("Listing keys failed")? {
        ListOutcome::Keys(keys) => keys,
        ListOutcome::Busy => return Err(TransactionBusy.into()),
    };

    if !args.quiet && !args.json {
        println!();
        if keys.is_empty() {
            println!("{}", "No security keys registered".yellow());
        }
        for (i, key) in keys.iter().enumerate() {
            println!("   {} {}", format!("[{}]", i + 1).dimmed(), describe_key(key));
        }
    }

    Ok(())
}

/// One-line summary of a key descriptor.
fn describe_key(key: &Value) -> String {
    let handle = ["KeyHandle", "keyHandle"]
        .iter()
        .find_map(|field| key.get(*field).and_then(Value::as_str));
    match handle {
        Some(handle) => handle.to_string(),
        None => key.to_string(),
    }
}
