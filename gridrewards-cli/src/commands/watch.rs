//! Watch command - continuous reward monitoring.
//!
//! Two independent cadences share one orchestrator: reward periods
//! refresh often, the device inventory rarely. A transient failure keeps
//! the last good value on screen with its age instead of blanking it.
//! Ctrl+C cancels in-flight fetches and flushes the quota counters.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Args;
use std::collections::HashMap;
use std::io::{stdout, Write};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

use gridrewards_core::{Device, GridRewards, HomeId, StandardPeriod};
use gridrewards_fetch::{FetchOrchestrator, PeriodOutcome};

use crate::commands::{build_orchestrator, resolve_home};
use crate::output::TextFormatter;
use crate::Cli;

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Reward refresh interval in seconds. Defaults from the config file.
    #[arg(long, short)]
    pub interval: Option<u64>,

    /// Minimum interval to use.
    #[arg(long, default_value = "60")]
    pub min_interval: u64,
}

/// Last good value per period, for display across failed refreshes.
type LastGood = HashMap<StandardPeriod, (GridRewards, DateTime<Local>)>;

/// Runs the watch command.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<()> {
    let (orchestrator, config) = build_orchestrator(cli).await?;
    let home_id = resolve_home(cli, &config, &orchestrator).await?;

    let rewards_every = args
        .interval
        .map_or_else(|| config.rewards_interval(), Duration::from_secs)
        .max(Duration::from_secs(args.min_interval));
    let devices_every = config.devices_interval();

    info!(
        home = %home_id,
        rewards_secs = rewards_every.as_secs(),
        devices_secs = devices_every.as_secs(),
        "Starting watch mode"
    );

    let formatter = TextFormatter::new(!cli.no_color);

    let mut rewards_ticker = interval(rewards_every);
    rewards_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut devices_ticker = interval(devices_every);
    devices_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut devices: Vec<Device> = Vec::new();
    let mut last_good: LastGood = HashMap::new();

    loop {
        tokio::select! {
            _ = rewards_ticker.tick() => {
                let outcomes = orchestrator.fetch_standard(&home_id, Utc::now()).await;
                remember_successes(&outcomes, &mut last_good);
                redraw(
                    &formatter,
                    &home_id,
                    &outcomes,
                    &last_good,
                    &devices,
                    rewards_every,
                    cli.verbose,
                    &orchestrator,
                )?;
            }
            _ = devices_ticker.tick() => {
                if let Ok(fresh) = orchestrator.devices(&home_id).await {
                    devices = fresh;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                orchestrator.shutdown();
                orchestrator.flush_state().await;
                println!();
                return Ok(());
            }
        }
    }
}

fn remember_successes(outcomes: &[PeriodOutcome], last_good: &mut LastGood) {
    for outcome in outcomes {
        if let (Some(label), Ok(rewards)) = (outcome.request.label, &outcome.result) {
            last_good.insert(label, (rewards.clone(), Local::now()));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn redraw(
    formatter: &TextFormatter,
    home_id: &HomeId,
    outcomes: &[PeriodOutcome],
    last_good: &LastGood,
    devices: &[Device],
    refresh: Duration,
    verbose: bool,
    orchestrator: &FetchOrchestrator,
) -> Result<()> {
    // Clear screen
    print!("\x1b[2J\x1b[H");
    stdout().flush()?;

    let now = Local::now();
    println!(
        "GridRewards Watch - {} (refresh: {}s)",
        now.format("%H:%M:%S"),
        refresh.as_secs()
    );
    println!("{}", "─".repeat(50));
    println!();

    println!("{}", formatter.format_outcomes(home_id, outcomes));

    // Failed periods keep their last good value on screen, with its age.
    let stale: Vec<String> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .filter_map(|o| o.request.label)
        .filter_map(|label| {
            last_good.get(&label).map(|(rewards, at)| {
                format!(
                    "  {} last good {} at {}",
                    label,
                    rewards.total.map_or_else(|| "-".to_string(), |t| format!("{t:.2}")),
                    at.format("%H:%M:%S")
                )
            })
        })
        .collect();
    if !stale.is_empty() {
        println!();
        println!("Stale values (kept from earlier refreshes):");
        for line in stale {
            println!("{line}");
        }
    }

    if !devices.is_empty() {
        println!();
        println!("{}", formatter.format_devices(home_id, devices));
    }

    if verbose {
        println!();
        println!("{}", formatter.format_diagnostics(&orchestrator.diagnostics()));
    }

    println!();
    println!("Press Ctrl+C to exit");
    Ok(())
}
