//! Keyward CLI - U2F registration and authentication against a relying party.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod exit_codes;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Ceremony completed
  1   General error
  64  Usage error (missing identity)
  65  Security key rejected the request or replied with garbage
  69  Relying party unreachable or no security key support
  75  Another transaction in flight, or the key was never touched
  78  Invalid configuration";

#[derive(Parser)]
#[command(name = "keyward")]
#[command(author, version, about = "Single-flight U2F ceremonies against a relying party", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Relying-party base URL
    #[arg(long, global = true, env = "KEYWARD_SERVER_URL", default_value = keyward_core::config::DEFAULT_SERVER_URL)]
    pub server: String,

    /// Endpoint layout: `fixed` or `per-identity`
    #[arg(long, global = true, env = "KEYWARD_ENDPOINT_LAYOUT", default_value = "per-identity")]
    pub layout: String,

    /// Seconds to wait for the security key touch
    #[arg(long, global = true, env = "KEYWARD_DEVICE_TIMEOUT_SECS", default_value_t = 30)]
    pub device_timeout: u64,

    /// Seconds to wait for each relying-party request
    #[arg(long, global = true, env = "KEYWARD_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout: u64,

    /// Use a mock security key instead of a real one (for testing)
    #[arg(long, global = true)]
    pub mock: bool,

    /// Make the mock security key answer with this U2F error code
    #[arg(long, global = true, value_name = "CODE", requires = "mock")]
    pub mock_error: Option<u32>,

    /// Print the action log as JSON when done
    #[arg(long, global = true)]
    pub json: bool,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase tracing verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new security key for an identity
    Register {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },

    /// Authenticate an identity with a registered security key
    Authenticate {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },

    /// List the security keys registered to an identity
    List {
        #[arg(value_name = "IDENTITY")]
        identity: String,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("keyward_core=debug,keyward_cli=debug,info"),
        _ => EnvFilter::new("keyward_core=trace,keyward_cli=trace,debug"),
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = match cli.command {
        Commands::Register { identity } => {
            commands::ceremony::execute(&cli.global, keyward_core::CeremonyKind::Registration, identity)
                .await
        }
        Commands::Authenticate { identity } => {
            commands::ceremony::execute(&cli.global, keyward_core::CeremonyKind::Authentication, identity)
                .await
        }
        Commands::List { identity } => commands::list::execute(&cli.global, identity).await,
    };

    let exit = match result {
        Ok(()) => ExitCode::success(),
        Err(e) => ExitCode::from_anyhow(&e),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
