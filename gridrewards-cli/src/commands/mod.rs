//! CLI command implementations.

pub mod devices;
pub mod diag;
pub mod homes;
pub mod rewards;
pub mod watch;

use anyhow::{Context, Result};
use std::sync::Arc;

use gridrewards_core::HomeId;
use gridrewards_fetch::{FetchOrchestrator, TibberGateway};
use gridrewards_store::{credentials_from_env, Config, FileStateStore};

use crate::Cli;

/// Loads config, reads credentials, and assembles the full fetch stack.
///
/// Every command goes through here so they all share the same persisted
/// limiter counters and config defaults.
pub async fn build_orchestrator(cli: &Cli) -> Result<(FetchOrchestrator, Config)> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path).await?,
        None => Config::load().await?,
    };

    let credentials = credentials_from_env()?;
    let gateway = Arc::new(TibberGateway::new()?);

    let orchestrator = FetchOrchestrator::builder(gateway, credentials)
        .retry_policy(config.retry_policy())
        .limiter_config(config.limiter_config())
        .state_store(Arc::new(FileStateStore::new()))
        .build();
    orchestrator.restore_state().await;

    Ok((orchestrator, config))
}

/// Resolves the home to query: CLI flag, then config, then discovery.
pub async fn resolve_home(
    cli: &Cli,
    config: &Config,
    orchestrator: &FetchOrchestrator,
) -> Result<HomeId> {
    if let Some(raw) = cli.home.as_ref().or(config.home_id.as_ref()) {
        return HomeId::new(raw).context("invalid home id");
    }

    let homes = orchestrator.homes().await?;
    let first = homes
        .first()
        .context("account has no homes; pass --home or set home_id in the config")?;
    HomeId::new(&first.id).context("account returned a malformed home id")
}
