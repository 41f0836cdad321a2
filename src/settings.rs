// =============================================================================
// Agent Settings — credentials and tunables read once from the environment
// =============================================================================
//
// Credentials are required: a missing API_KEY / API_SECRET aborts startup.
// Every other variable is optional and falls back to the defaults below. A
// variable that is present but unparsable is also fatal, so a typo never
// silently runs the agent with a default policy.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::types::EntryPolicy;

const DEFAULT_TRIGGER_FILE: &str = "config.json";
const DEFAULT_REFERENCE_SYMBOL: &str = "BTCUSDT";
const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_POLL_SECS: u64 = 3;
const DEFAULT_BACKOFF_SECS: u64 = 5;

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Runtime knobs for the polling agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Crossing direction for this run.
    pub policy: EntryPolicy,
    /// JSON file holding the trigger levels; re-read every cycle.
    pub trigger_file: PathBuf,
    /// Symbol whose price is compared against the levels.
    pub reference_symbol: String,
    /// REST base URL of the futures exchange.
    pub base_url: String,
    /// Sleep between successful cycles.
    pub poll_interval: Duration,
    /// Sleep after a failed cycle.
    pub backoff_interval: Duration,
    /// Re-check positions after a close sweep before terminating.
    pub verify_flat: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            policy: EntryPolicy::default(),
            trigger_file: PathBuf::from(DEFAULT_TRIGGER_FILE),
            reference_symbol: DEFAULT_REFERENCE_SYMBOL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            backoff_interval: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            verify_flat: false,
        }
    }
}

impl Credentials {
    /// Read `API_KEY` and `API_SECRET` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("API_KEY")
            .filter(|v| !v.is_empty())
            .context("API_KEY is not set")?;
        let api_secret = lookup("API_SECRET")
            .filter(|v| !v.is_empty())
            .context("API_SECRET is not set")?;
        Ok(Self { api_key, api_secret })
    }
}

impl AgentSettings {
    /// Build settings from `BOT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(v) = lookup("BOT_POLICY") {
            settings.policy = v.parse().context("invalid BOT_POLICY")?;
        }
        if let Some(v) = lookup("BOT_TRIGGER_FILE") {
            settings.trigger_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("BOT_REFERENCE_SYMBOL") {
            settings.reference_symbol = v.trim().to_uppercase();
        }
        if let Some(v) = lookup("BOT_BASE_URL") {
            settings.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("BOT_POLL_SECS") {
            let secs: u64 = v.trim().parse().context("invalid BOT_POLL_SECS")?;
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("BOT_BACKOFF_SECS") {
            let secs: u64 = v.trim().parse().context("invalid BOT_BACKOFF_SECS")?;
            settings.backoff_interval = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("BOT_VERIFY_FLAT") {
            settings.verify_flat = v.trim().parse().context("invalid BOT_VERIFY_FLAT")?;
        }

        Ok(settings)
    }
}
