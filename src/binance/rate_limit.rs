// =============================================================================
// Rate-Limit Observer — records Binance futures API usage from headers
// =============================================================================
//
// Binance USDⓈ-M futures enforce:
//   - Request weight: 2400 per minute.
//   - Order rate:     300 per 10 seconds and 1200 per minute.
//
// The observer reads the usage headers after every response and warns once
// usage is high. It never delays or blocks a request; the fixed poll interval
// is the agent's only pacing.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Per-minute request weight the exchange allows.
const WEIGHT_LIMIT_1M: u32 = 2400;
/// Warn once used weight reaches this level.
const WEIGHT_WARN_THRESHOLD: u32 = 1800;
/// Per-minute order count the exchange allows.
const ORDER_LIMIT_1M: u32 = 1200;

/// Lock-free counters mirroring the exchange's usage headers.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    order_count_10s: AtomicU32,
    order_count_1m: AtomicU32,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub order_count_10s: u32,
    pub order_count_1m: u32,
}

fn header_u32(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            order_count_10s: AtomicU32::new(0),
            order_count_1m: AtomicU32::new(0),
        }
    }

    /// Update the counters from a response's headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(w) = header_u32(headers, "X-MBX-USED-WEIGHT-1M") {
            let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
            if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                warn!(
                    used_weight = w,
                    limit = WEIGHT_LIMIT_1M,
                    "rate-limit weight crossed warning threshold"
                );
            }
            debug!(used_weight_1m = w, "rate-limit weight updated from header");
        }

        if let Some(c) = header_u32(headers, "X-MBX-ORDER-COUNT-10S") {
            self.order_count_10s.store(c, Ordering::Relaxed);
        }

        if let Some(c) = header_u32(headers, "X-MBX-ORDER-COUNT-1M") {
            self.order_count_1m.store(c, Ordering::Relaxed);
            if c >= ORDER_LIMIT_1M {
                warn!(order_count_1m = c, limit = ORDER_LIMIT_1M, "per-minute order limit reached");
            }
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
            order_count_10s: self.order_count_10s.load(Ordering::Relaxed),
            order_count_1m: self.order_count_1m.load(Ordering::Relaxed),
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &snap.used_weight_1m)
            .field("order_count_10s", &snap.order_count_10s)
            .field("order_count_1m", &snap.order_count_1m)
            .finish()
    }
}
