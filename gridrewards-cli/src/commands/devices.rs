//! Devices command - list reward-bearing devices for a home.

use anyhow::Result;
use tracing::info;

use crate::commands::{build_orchestrator, resolve_home};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the devices command.
pub async fn run(cli: &Cli) -> Result<()> {
    let (orchestrator, config) = build_orchestrator(cli).await?;
    let home_id = resolve_home(cli, &config, &orchestrator).await?;

    let devices = orchestrator.devices(&home_id).await?;
    orchestrator.flush_state().await;

    info!(home = %home_id, count = devices.len(), "Fetched device list");

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.render_devices(&home_id, &devices)?);
        }
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_devices(&home_id, &devices));
        }
    }

    Ok(())
}
