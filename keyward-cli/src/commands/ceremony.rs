//! Register and authenticate commands.

use anyhow::{Context, Result};
use colored::Colorize;
use keyward_core::{CeremonyKind, Outcome};
use tracing::info;

use super::{open_session, print_log_json, LogPrinter};
use crate::exit_codes::TransactionBusy;
use crate::GlobalArgs;

/// Execute a registration or authentication ceremony.
pub async fn execute(args: &GlobalArgs, kind: CeremonyKind, identity: String) -> Result<()> {
    let session = open_session(args)?;
    let mut printer = LogPrinter::attach(&session, args);

    info!(%kind, identity = %identity, "Starting ceremony");
    let result = printer.follow(session.start(kind, &identity)).await;
    print_log_json(&session, args)?;

    match result.with_context(|| format!("{} failed", capitalize(&kind.to_string())))? {
        Outcome::Completed { ack, .. } => {
            if !args.quiet && !args.json {
                println!();
                println!("{}", kind.completed_label().green().bold());
                println!("   {} {}", "Identity:".dimmed(), identity.trim());
                println!("   {} {}", "Server:".dimmed(), session.config().endpoints.base());
                println!("   {} {}", "Reply:".dimmed(), ack.as_json());
            }
            Ok(())
        }
        Outcome::Busy => Err(TransactionBusy.into()),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("registration"), "Registration");
        assert_eq!(capitalize(""), "");
    }
}
