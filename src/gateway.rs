// =============================================================================
// Exchange Gateway — the capabilities the agent consumes from an exchange
// =============================================================================
//
// The run loop and the order executor only talk to this trait. The Binance
// futures client implements it for production; tests substitute an
// in-memory exchange.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;

use crate::binance::{BinanceClient, PositionRisk};
use crate::types::{OrderSide, PositionSide};

/// A market order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub position_side: PositionSide,
    /// Local clock plus the synced offset, in milliseconds.
    pub timestamp_ms: i64,
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: Option<i64>,
    pub status: Option<String>,
}

impl OrderAck {
    pub fn from_response(body: &serde_json::Value) -> Self {
        Self {
            order_id: body.get("orderId").and_then(|v| v.as_i64()),
            status: body
                .get("status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Exchange clock in milliseconds.
    async fn server_time(&self) -> Result<i64>;

    /// Last price for `symbol`.
    async fn ticker_price(&self, symbol: &str) -> Result<f64>;

    /// Signed position amounts for the account.
    async fn open_positions(&self, timestamp_ms: i64) -> Result<Vec<PositionRisk>>;

    /// Submit `order` as a MARKET order.
    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck>;
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn server_time(&self) -> Result<i64> {
        self.get_server_time().await
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        self.get_ticker_price(symbol).await
    }

    async fn open_positions(&self, timestamp_ms: i64) -> Result<Vec<PositionRisk>> {
        self.get_positions(timestamp_ms).await
    }

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck> {
        let body = self
            .place_market_order(
                &order.symbol,
                order.side,
                order.quantity,
                order.position_side,
                order.timestamp_ms,
            )
            .await?;
        Ok(OrderAck::from_response(&body))
    }
}

// -----------------------------------------------------------------------------
// In-memory exchange for tests
// -----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::{HashMap, HashSet, VecDeque};

    use parking_lot::Mutex;

    use super::*;

    /// Scripted exchange. Each symbol has a price queue; the last price
    /// repeats once the queue is down to one entry. Orders update the
    /// account's signed position amounts.
    #[derive(Default)]
    pub struct MockGateway {
        pub server_time: Mutex<i64>,
        prices: Mutex<HashMap<String, VecDeque<f64>>>,
        failing_prices: Mutex<HashSet<String>>,
        positions: Mutex<Vec<PositionRisk>>,
        pub fail_positions: Mutex<bool>,
        pub fail_next_orders: Mutex<usize>,
        pub orders: Mutex<Vec<MarketOrder>>,
        pub position_queries: Mutex<usize>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_prices(self, symbol: &str, prices: &[f64]) -> Self {
            self.prices
                .lock()
                .insert(symbol.to_string(), prices.iter().copied().collect());
            self
        }

        pub fn with_position(self, symbol: &str, position_amt: f64) -> Self {
            self.set_position(symbol, position_amt);
            self
        }

        pub fn failing_price(self, symbol: &str) -> Self {
            self.failing_prices.lock().insert(symbol.to_string());
            self
        }

        pub fn set_position(&self, symbol: &str, position_amt: f64) {
            let mut positions = self.positions.lock();
            match positions.iter_mut().find(|p| p.symbol == symbol) {
                Some(p) => p.position_amt = position_amt,
                None => positions.push(PositionRisk {
                    symbol: symbol.to_string(),
                    position_amt,
                }),
            }
        }

        pub fn position(&self, symbol: &str) -> f64 {
            self.positions
                .lock()
                .iter()
                .find(|p| p.symbol == symbol)
                .map(|p| p.position_amt)
                .unwrap_or(0.0)
        }

        pub fn orders(&self) -> Vec<MarketOrder> {
            self.orders.lock().clone()
        }
    }

    #[async_trait]
    impl ExchangeGateway for MockGateway {
        async fn server_time(&self) -> Result<i64> {
            Ok(*self.server_time.lock())
        }

        async fn ticker_price(&self, symbol: &str) -> Result<f64> {
            if self.failing_prices.lock().contains(symbol) {
                anyhow::bail!("ticker for {symbol} unavailable");
            }
            let mut prices = self.prices.lock();
            let queue = prices
                .get_mut(symbol)
                .ok_or_else(|| anyhow::anyhow!("unknown symbol {symbol}"))?;
            let price = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            };
            price.ok_or_else(|| anyhow::anyhow!("no price scripted for {symbol}"))
        }

        async fn open_positions(&self, _timestamp_ms: i64) -> Result<Vec<PositionRisk>> {
            *self.position_queries.lock() += 1;
            if *self.fail_positions.lock() {
                anyhow::bail!("account endpoint unavailable");
            }
            Ok(self.positions.lock().clone())
        }

        async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderAck> {
            {
                let mut failing = self.fail_next_orders.lock();
                if *failing > 0 {
                    *failing -= 1;
                    anyhow::bail!("order rejected: -2019 Margin is insufficient");
                }
            }
            let delta = match order.side {
                OrderSide::Buy => order.quantity,
                OrderSide::Sell => -order.quantity,
            };
            let current = self.position(&order.symbol);
            self.set_position(&order.symbol, current + delta);

            let mut orders = self.orders.lock();
            orders.push(order.clone());
            Ok(OrderAck {
                order_id: Some(orders.len() as i64),
                status: Some("NEW".to_string()),
            })
        }
    }
}
