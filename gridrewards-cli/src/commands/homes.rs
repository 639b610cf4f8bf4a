//! Homes command - list homes on the account.

use anyhow::Result;
use tracing::info;

use crate::commands::build_orchestrator;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the homes command.
pub async fn run(cli: &Cli) -> Result<()> {
    let (orchestrator, _config) = build_orchestrator(cli).await?;

    let homes = orchestrator.homes().await?;
    orchestrator.flush_state().await;

    info!(count = homes.len(), "Fetched home list");

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.render_homes(&homes)?);
        }
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_homes(&homes));
        }
    }

    Ok(())
}
