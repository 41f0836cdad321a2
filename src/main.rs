// =============================================================================
// Level Trigger Bot — Main Entry Point
// =============================================================================
//
// Polls the reference price, opens a fixed notional in each configured symbol
// when its level is crossed, and closes everything once the exit level is
// crossed. The process exits after the close sweep.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod binance;
mod evaluator;
mod execution;
mod gateway;
mod precision;
mod run_loop;
mod settings;
mod time_sync;
mod trigger_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::BinanceClient;
use crate::run_loop::RunLoop;
use crate::settings::{AgentSettings, Credentials};
use crate::time_sync::ClockOffset;
use crate::trigger_config::JsonFileTriggerSource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let credentials = Credentials::from_env()?;
    let settings = AgentSettings::from_env()?;

    info!(
        policy = %settings.policy,
        reference = %settings.reference_symbol,
        trigger_file = %settings.trigger_file.display(),
        base_url = %settings.base_url,
        "Level Trigger Bot starting up"
    );

    // ── 2. Exchange client & clock sync ──────────────────────────────────
    let client = Arc::new(
        BinanceClient::new(
            credentials.api_key,
            credentials.api_secret,
            settings.base_url.clone(),
        )
        .context("failed to build exchange client")?,
    );
    let clock = ClockOffset::sync(client.as_ref()).await?;

    // ── 3. Run loop ──────────────────────────────────────────────────────
    let triggers = JsonFileTriggerSource::new(&settings.trigger_file);
    info!(path = %triggers.path().display(), "trigger levels are re-read every cycle");

    let run_loop = RunLoop::new(client.clone(), triggers, settings, clock);

    tokio::select! {
        summary = run_loop.run() => {
            info!(
                cycles = summary.cycles,
                loop_errors = summary.loop_errors,
                entries_attempted = summary.entries_attempted,
                entries_placed = summary.entries_placed,
                close_sweeps = summary.close_sweeps,
                closes_placed = summary.closes_placed,
                action_failures = summary.action_failures,
                "run complete"
            );
        }
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            warn!("shutdown signal received, open positions are left as they are");
        }
    }

    let usage = client.rate_limits().snapshot();
    info!(
        used_weight_1m = usage.used_weight_1m,
        order_count_10s = usage.order_count_10s,
        order_count_1m = usage.order_count_1m,
        "Level Trigger Bot shut down"
    );
    Ok(())
}
