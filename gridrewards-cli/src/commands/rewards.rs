//! Rewards command - fetch and display reward earnings.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tracing::info;

use crate::commands::{build_orchestrator, resolve_home};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the rewards command.
#[derive(Args, Default)]
pub struct RewardsArgs {
    /// Show the diagnostics snapshot after fetching.
    #[arg(long)]
    pub diag: bool,
}

/// Runs the rewards command.
pub async fn run(args: &RewardsArgs, cli: &Cli) -> Result<()> {
    let (orchestrator, config) = build_orchestrator(cli).await?;
    let home_id = resolve_home(cli, &config, &orchestrator).await?;

    info!(home = %home_id, "Fetching standard reward periods");

    let outcomes = orchestrator.fetch_standard(&home_id, Utc::now()).await;
    orchestrator.flush_state().await;

    // Credential failures are total; surface the typed error so main can
    // map it to the credentials exit code.
    if outcomes.iter().any(|o| {
        matches!(
            o.result,
            Err(gridrewards_fetch::FetchError::CredentialsInvalid)
        )
    }) {
        return Err(gridrewards_fetch::FetchError::CredentialsInvalid.into());
    }

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.render_outcomes(&home_id, &outcomes)?);
        }
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_outcomes(&home_id, &outcomes));
            if args.diag {
                println!();
                println!("{}", formatter.format_diagnostics(&orchestrator.diagnostics()));
            }
        }
    }

    if outcomes.iter().all(|o| o.result.is_err()) {
        std::process::exit(ExitCode::AllPeriodsFailed as i32);
    }

    Ok(())
}
