// =============================================================================
// Run Loop — poll, decide, act, sleep
// =============================================================================
//
// States:
//   Polling  ->  Polling     fetch reference, reload triggers, enter crossings
//   Polling  ->  Closing     exit crossed while something is held
//   Closing  ->  Terminated  one close sweep over every entered symbol
//   Closing  ->  Closing     (verify_flat only) a swept symbol is still held
//
// A cycle that returns an error is logged and followed by the longer back-off
// sleep; the state is left unchanged so the next cycle retries it. The loop
// is the sole owner of the triggered set and the clock offset.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::evaluator::{evaluate, should_close_all, TriggeredSet};
use crate::execution::{ActionOutcome, OrderExecutor};
use crate::gateway::ExchangeGateway;
use crate::settings::AgentSettings;
use crate::time_sync::ClockOffset;
use crate::trigger_config::TriggerSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Polling,
    Closing,
    Terminated,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling => write!(f, "Polling"),
            Self::Closing => write!(f, "Closing"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub loop_errors: u64,
    pub entries_attempted: u64,
    pub entries_placed: u64,
    pub close_sweeps: u64,
    pub closes_placed: u64,
    pub action_failures: u64,
}

pub struct RunLoop<S: TriggerSource> {
    gateway: Arc<dyn ExchangeGateway>,
    executor: OrderExecutor,
    triggers: S,
    settings: AgentSettings,
    clock: ClockOffset,
    triggered: TriggeredSet,
    state: LoopState,
    summary: RunSummary,
}

impl<S: TriggerSource> RunLoop<S> {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        triggers: S,
        settings: AgentSettings,
        clock: ClockOffset,
    ) -> Self {
        let executor = OrderExecutor::new(gateway.clone(), settings.policy);
        Self {
            gateway,
            executor,
            triggers,
            settings,
            clock,
            triggered: TriggeredSet::new(),
            state: LoopState::Polling,
            summary: RunSummary::default(),
        }
    }

    /// Drive cycles until the loop terminates.
    pub async fn run(mut self) -> RunSummary {
        info!(
            policy = %self.executor.policy(),
            reference = %self.settings.reference_symbol,
            poll_secs = self.settings.poll_interval.as_secs(),
            verify_flat = self.settings.verify_flat,
            "agent started, monitoring reference price"
        );

        while self.state != LoopState::Terminated {
            match self.step().await {
                Ok(()) => {
                    if self.state != LoopState::Terminated {
                        tokio::time::sleep(self.settings.poll_interval).await;
                    }
                }
                Err(e) => {
                    self.summary.loop_errors += 1;
                    error!(
                        state = %self.state,
                        error = %format!("{e:#}"),
                        backoff_secs = self.settings.backoff_interval.as_secs(),
                        "error in run loop"
                    );
                    tokio::time::sleep(self.settings.backoff_interval).await;
                }
            }
        }

        self.summary
    }

    /// Run one cycle for the current state.
    pub async fn step(&mut self) -> Result<()> {
        self.summary.cycles += 1;
        match self.state {
            LoopState::Polling => self.poll_cycle().await,
            LoopState::Closing => self.close_sweep().await,
            LoopState::Terminated => Ok(()),
        }
    }

    async fn poll_cycle(&mut self) -> Result<()> {
        let reference = self.settings.reference_symbol.as_str();
        let price = self
            .gateway
            .ticker_price(reference)
            .await
            .with_context(|| format!("failed to fetch {reference} price"))?;
        info!(symbol = reference, price, "reference price");

        let snapshot = self.triggers.snapshot()?;
        let policy = self.executor.policy();
        let decision = evaluate(policy, price, &snapshot, &self.triggered);
        debug!(
            entries = decision.entries.len(),
            close_all = decision.close_all,
            "trigger evaluation"
        );

        for entry in decision.entries {
            info!(
                symbol = %entry.symbol,
                level = entry.price_level,
                notional_usdt = entry.notional_usdt,
                price,
                "entry level crossed"
            );
            let outcome = self
                .executor
                .open_position(&entry.symbol, entry.notional_usdt, self.clock)
                .await;
            self.summary.entries_attempted += 1;
            match &outcome {
                ActionOutcome::Placed { .. } => self.summary.entries_placed += 1,
                ActionOutcome::Failed { .. } => {
                    self.summary.action_failures += 1;
                    warn!(symbol = %entry.symbol, %outcome, "entry failed, symbol stays marked");
                }
                ActionOutcome::NothingToClose => {}
            }
            // Marked whatever the outcome; a symbol is attempted once per run.
            self.triggered.insert(entry.symbol);
        }

        if should_close_all(policy, price, snapshot.exit_level, &self.triggered) {
            info!(
                price,
                exit_level = snapshot.exit_level,
                held = self.triggered.len(),
                symbols = ?self.triggered.iter().collect::<Vec<_>>(),
                "exit trigger hit, closing positions"
            );
            self.state = LoopState::Closing;
            self.close_sweep().await?;
        }

        Ok(())
    }

    async fn close_sweep(&mut self) -> Result<()> {
        self.summary.close_sweeps += 1;
        let symbols: Vec<String> = self.triggered.iter().map(str::to_string).collect();

        let mut failed: Vec<&str> = Vec::new();
        for symbol in &symbols {
            let outcome = self.executor.close_position(symbol, self.clock).await;
            match &outcome {
                ActionOutcome::Placed { .. } => self.summary.closes_placed += 1,
                ActionOutcome::NothingToClose => {
                    debug!(symbol = %symbol, "nothing held, skipped");
                }
                ActionOutcome::Failed { .. } => {
                    self.summary.action_failures += 1;
                    failed.push(symbol);
                }
            }
        }

        if !self.settings.verify_flat {
            if !failed.is_empty() {
                warn!(
                    failed = ?failed,
                    "some closes failed; ending run without confirming positions are flat"
                );
            }
            info!(swept = symbols.len(), "all positions closed, exiting");
            self.state = LoopState::Terminated;
            return Ok(());
        }

        let mut still_open = Vec::new();
        for symbol in &symbols {
            let held = self
                .executor
                .still_holds(symbol, self.clock)
                .await
                .context("failed to verify positions after close sweep")?;
            if held {
                still_open.push(symbol.as_str());
            }
        }

        if still_open.is_empty() {
            info!(swept = symbols.len(), "all positions verified flat, exiting");
            self.state = LoopState::Terminated;
        } else {
            warn!(
                still_open = ?still_open,
                "positions remain after close sweep, retrying next cycle"
            );
        }
        Ok(())
    }
}
