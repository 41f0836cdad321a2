// =============================================================================
// Binance USDⓈ-M Futures REST Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. Signed requests
// carry X-MBX-APIKEY as a header and a recvWindow of 10 000 ms. The caller
// supplies the request timestamp so the clock offset measured at startup is
// applied uniformly.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use tracing::{debug, instrument};

use super::rate_limit::RateLimitTracker;
use crate::types::{OrderSide, PositionSide};

type HmacSha256 = Hmac<Sha256>;

/// recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 10_000;

/// Signed-quantity holding for one symbol as reported by the account.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: f64,
}

/// Binance futures REST client with HMAC-SHA256 request signing.
pub struct BinanceClient {
    secret: String,
    base_url: String,
    client: reqwest::Client,
    rate_limits: RateLimitTracker,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient` against `base_url`.
    ///
    /// # Arguments
    /// * `api_key`  — Binance API key (sent as a header, never in query params).
    /// * `secret`   — Binance secret key used exclusively for HMAC signing.
    /// * `base_url` — e.g. `https://fapi.binance.com`.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let base_url = base_url.into();

        let mut default_headers = HeaderMap::new();
        let key_header =
            HeaderValue::from_str(&api_key).context("API key is not a valid header value")?;
        default_headers.insert("x-mbx-apikey", key_header);

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            secret: secret.into(),
            base_url,
            client,
            rate_limits: RateLimitTracker::new(),
        })
    }

    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    pub fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build the full query string for a signed request (appends recvWindow,
    /// timestamp and signature).
    fn signed_query(&self, params: &str, timestamp_ms: i64) -> String {
        let base = if params.is_empty() {
            format!("recvWindow={RECV_WINDOW}&timestamp={timestamp_ms}")
        } else {
            format!("{params}&recvWindow={RECV_WINDOW}&timestamp={timestamp_ms}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    /// Record rate-limit headers, decode the body and fail on non-2xx.
    async fn read_body(&self, resp: reqwest::Response, endpoint: &str) -> Result<serde_json::Value> {
        self.rate_limits.update_from_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {endpoint} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance {} returned {}: {}", endpoint, status, body);
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/time — exchange clock in milliseconds.
    #[instrument(skip(self), name = "binance::get_server_time")]
    pub async fn get_server_time(&self) -> Result<i64> {
        let url = format!("{}/fapi/v1/time", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/time request failed")?;
        let body = self.read_body(resp, "GET /fapi/v1/time").await?;

        let server_time = body["serverTime"]
            .as_i64()
            .context("time response missing 'serverTime'")?;
        debug!(server_time, "server time retrieved");
        Ok(server_time)
    }

    /// GET /fapi/v1/ticker/price — last traded price for `symbol`.
    #[instrument(skip(self), name = "binance::get_ticker_price")]
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/ticker/price request failed")?;
        let body = self.read_body(resp, "GET /fapi/v1/ticker/price").await?;

        let price = Self::parse_str_f64(&body["price"])
            .with_context(|| format!("ticker response for {symbol} has no usable 'price'"))?;
        debug!(symbol, price, "ticker price retrieved");
        Ok(price)
    }

    // -------------------------------------------------------------------------
    // Account
    // -------------------------------------------------------------------------

    /// GET /fapi/v2/account (signed) — every position row in the account.
    #[instrument(skip(self), name = "binance::get_positions")]
    pub async fn get_positions(&self, timestamp_ms: i64) -> Result<Vec<PositionRisk>> {
        let qs = self.signed_query("", timestamp_ms);
        let url = format!("{}/fapi/v2/account?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/account request failed")?;
        let body = self.read_body(resp, "GET /fapi/v2/account").await?;

        let rows = body["positions"]
            .as_array()
            .context("account response missing 'positions' array")?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol = row["symbol"]
                .as_str()
                .context("position entry missing 'symbol'")?
                .to_string();
            let position_amt = Self::parse_str_f64(&row["positionAmt"])
                .with_context(|| format!("position {symbol} has no usable 'positionAmt'"))?;
            positions.push(PositionRisk { symbol, position_amt });
        }

        debug!(count = positions.len(), "account positions retrieved");
        Ok(positions)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /fapi/v1/order (signed) — submit a MARKET order.
    ///
    /// # Arguments
    /// * `symbol`        — e.g. "XRPUSDT"
    /// * `side`          — BUY or SELL
    /// * `quantity`      — already rounded to the instrument's precision
    /// * `position_side` — position mode (always BOTH for one-way accounts)
    /// * `timestamp_ms`  — request timestamp, clock offset already applied
    #[instrument(skip(self), name = "binance::place_market_order")]
    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        position_side: PositionSide,
        timestamp_ms: i64,
    ) -> Result<serde_json::Value> {
        let params = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={quantity}&positionSide={position_side}"
        );
        let qs = self.signed_query(&params, timestamp_ms);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        debug!(symbol, %side, quantity, "placing market order");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /fapi/v1/order request failed")?;
        let body = self.read_body(resp, "POST /fapi/v1/order").await?;

        debug!(symbol, %side, "order placed successfully");
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("rate_limits", &self.rate_limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BinanceClient {
        BinanceClient::new("key", "s3cr3t-value", "https://fapi.binance.com").unwrap()
    }

    #[test]
    fn signature_is_hex_hmac_sha256() {
        // Reference pair from the Binance signed-endpoint documentation.
        let c = BinanceClient::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            "https://fapi.binance.com",
        )
        .unwrap();
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            c.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signed_query_appends_window_timestamp_and_signature() {
        let c = client();
        let qs = c.signed_query("symbol=XRPUSDT", 1_700_000_000_123);
        assert!(qs.starts_with("symbol=XRPUSDT&recvWindow=10000&timestamp=1700000000123&signature="));

        let bare = c.signed_query("", 42);
        assert!(bare.starts_with("recvWindow=10000&timestamp=42&signature="));
        let sig = bare.rsplit('=').next().unwrap();
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn parse_accepts_strings_and_numbers() {
        assert_eq!(
            BinanceClient::parse_str_f64(&serde_json::json!("-12.5")).unwrap(),
            -12.5
        );
        assert_eq!(BinanceClient::parse_str_f64(&serde_json::json!(3)).unwrap(), 3.0);
        assert!(BinanceClient::parse_str_f64(&serde_json::json!(null)).is_err());
        assert!(BinanceClient::parse_str_f64(&serde_json::json!("abc")).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let dbg = format!("{:?}", client());
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("s3cr3t-value"));
    }
}
