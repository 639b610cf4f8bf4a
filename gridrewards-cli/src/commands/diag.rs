//! Diag command - print the observability snapshot.
//!
//! Builds the fetch stack and restores persisted quota counters, so the
//! limiter occupancy reflects what other invocations already spent. Cache
//! and retry numbers are per-process and start empty here.

use anyhow::Result;

use crate::commands::build_orchestrator;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the diag command.
pub async fn run(cli: &Cli) -> Result<()> {
    let (orchestrator, _config) = build_orchestrator(cli).await?;
    let diag = orchestrator.diagnostics();

    match cli.format {
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.render_diagnostics(&diag)?);
        }
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_diagnostics(&diag));
        }
    }

    Ok(())
}
