// =============================================================================
// Clock offset — one-shot synchronisation against the exchange clock
// =============================================================================
//
// The offset (server time minus local time) is measured once at startup and
// added to every signed-request timestamp for the rest of the run.
// =============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::gateway::ExchangeGateway;

/// Drift beyond which the local clock is worth a warning.
const DRIFT_WARN_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOffset {
    offset_ms: i64,
}

impl ClockOffset {
    pub fn from_millis(offset_ms: i64) -> Self {
        Self { offset_ms }
    }

    /// Measure the offset against `gateway`'s server time.
    pub async fn sync(gateway: &dyn ExchangeGateway) -> Result<Self> {
        let server_time = gateway
            .server_time()
            .await
            .context("initial time sync failed")?;
        let local_time = Utc::now().timestamp_millis();
        let offset = Self::from_millis(server_time - local_time);

        info!(offset_ms = offset.offset_ms(), "synced time offset");
        if offset.offset_ms.abs() > DRIFT_WARN_MS {
            warn!(
                offset_ms = offset.offset_ms,
                "local clock differs from the exchange by more than 1s"
            );
        }
        Ok(offset)
    }

    pub fn offset_ms(self) -> i64 {
        self.offset_ms
    }

    /// Local time adjusted to the exchange clock, in milliseconds.
    pub fn now_ms(self) -> i64 {
        Utc::now().timestamp_millis() + self.offset_ms
    }
}
