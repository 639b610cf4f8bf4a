// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! GridRewards CLI - grid-reward earnings from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Show rewards for the standard periods
//! gridrewards
//!
//! # Show rewards for a specific home
//! gridrewards --home 96a14971-525a-4420-aae9-e5aedaa129ff
//!
//! # JSON output
//! gridrewards --format json --pretty
//!
//! # List homes and reward devices
//! gridrewards homes
//! gridrewards devices
//!
//! # Watch mode
//! gridrewards watch --interval 900
//!
//! # Inspect quota and cache state
//! gridrewards diag
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{devices, diag, homes, rewards, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// GridRewards CLI - grid-reward earnings monitoring.
#[derive(Parser)]
#[command(name = "gridrewards")]
#[command(about = "Grid-reward earnings from your Tibber homes")]
#[command(long_about = r#"
GridRewards fetches smart-charging and home-battery reward earnings.

Credentials come from the environment:
  TIBBER_EMAIL     account email
  TIBBER_PASSWORD  account password

Examples:
  gridrewards                    # Standard periods for the configured home
  gridrewards --home <uuid>      # Explicit home
  gridrewards --format json      # JSON output
  gridrewards homes              # List account homes
  gridrewards devices            # List reward-bearing devices
  gridrewards watch              # Poll continuously
"#)]
#[command(version)]
#[command(author = "gridrewards contributors")]
pub struct Cli {
    /// Subcommand to run. If none, runs 'rewards' by default.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Home UUID to query. Falls back to the config file, then to the
    /// first home on the account.
    #[arg(long, global = true)]
    pub home: Option<String>,

    /// Path to the config file.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch reward earnings (default if no command specified).
    #[command(visible_aliases = ["r", "fetch"])]
    Rewards(rewards::RewardsArgs),

    /// List homes on the account.
    #[command(visible_alias = "h")]
    Homes,

    /// List reward-bearing devices for a home.
    #[command(visible_alias = "d")]
    Devices,

    /// Poll continuously and redraw on every refresh.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Drop every cached response before the next fetch.
    #[command(name = "clear-cache")]
    ClearCache,

    /// Show the observability snapshot (quota, cache, auth age).
    Diag,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Credentials missing or rejected.
    CredentialsError = 2,
    /// Every requested period failed.
    AllPeriodsFailed = 3,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("gridrewards=debug,info")
    } else {
        EnvFilter::new("gridrewards=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Some(Commands::Rewards(args)) => rewards::run(args, &cli).await,
        Some(Commands::Homes) => homes::run(&cli).await,
        Some(Commands::Devices) => devices::run(&cli).await,
        Some(Commands::Watch(args)) => watch::run(args, &cli).await,
        Some(Commands::ClearCache) => run_clear_cache(&cli).await,
        Some(Commands::Diag) => diag::run(&cli).await,
        None => rewards::run(&rewards::RewardsArgs::default(), &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(exit_code_for(&e) as i32);
    }

    Ok(())
}

/// Maps a command error to the process exit code.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if error
        .downcast_ref::<gridrewards_fetch::FetchError>()
        .is_some_and(|f| matches!(f, gridrewards_fetch::FetchError::CredentialsInvalid))
    {
        ExitCode::CredentialsError
    } else {
        ExitCode::Error
    }
}

/// Runs the clear-cache command.
async fn run_clear_cache(cli: &Cli) -> Result<()> {
    let (orchestrator, _config) = commands::build_orchestrator(cli).await?;
    orchestrator.clear_cache();
    if !cli.quiet {
        println!("Response cache cleared.");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gridrewards_fetch::FetchError;

    #[test]
    fn test_rejected_credentials_map_to_their_own_exit_code() {
        // The typed error must survive anyhow wrapping, including through
        // added context, so the process can exit with the documented code.
        let plain: anyhow::Error = FetchError::CredentialsInvalid.into();
        assert_eq!(exit_code_for(&plain), ExitCode::CredentialsError);

        let wrapped = plain.context("fetching rewards");
        assert_eq!(exit_code_for(&wrapped), ExitCode::CredentialsError);
    }

    #[test]
    fn test_other_errors_map_to_general_failure() {
        let err = anyhow::anyhow!("config file unreadable");
        assert_eq!(exit_code_for(&err), ExitCode::Error);

        let timeout: anyhow::Error =
            FetchError::Timeout(std::time::Duration::from_secs(20)).into();
        assert_eq!(exit_code_for(&timeout), ExitCode::Error);
    }
}
