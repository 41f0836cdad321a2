// =============================================================================
// Order Executor — turns entry / close decisions into market orders
// =============================================================================
//
// Every action returns an `ActionOutcome` instead of an error. Failures are
// logged here, reported to the run loop, and never abort the loop. There is
// no idempotency key: a retried entry after a timeout can enter twice.
// =============================================================================

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gateway::{ExchangeGateway, MarketOrder, OrderAck};
use crate::precision::{quantity_precision, round_to, size_quantity, CLOSE_QUANTITY_PRECISION};
use crate::time_sync::ClockOffset;
use crate::types::{EntryPolicy, OrderSide, PositionSide};

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// Step at which an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    PriceFetch,
    Sizing,
    PositionQuery,
    Submission,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriceFetch => write!(f, "price fetch"),
            Self::Sizing => write!(f, "sizing"),
            Self::PositionQuery => write!(f, "position query"),
            Self::Submission => write!(f, "submission"),
        }
    }
}

/// Outcome of an entry or close action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Order accepted by the exchange.
    Placed { order: MarketOrder, ack: OrderAck },
    /// Close found nothing to flatten in the policy's direction.
    NothingToClose,
    /// The action stopped at `stage`; nothing further was sent.
    Failed { stage: FailureStage, error: String },
}

impl ActionOutcome {
    fn failed(stage: FailureStage, error: impl std::fmt::Display) -> Self {
        Self::Failed {
            stage,
            error: format!("{error:#}"),
        }
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed { order, ack } => write!(
                f,
                "Placed({} {} {} order_id={})",
                order.side,
                order.quantity,
                order.symbol,
                ack.order_id.map(|id| id.to_string()).unwrap_or_else(|| "?".into())
            ),
            Self::NothingToClose => write!(f, "NothingToClose"),
            Self::Failed { stage, error } => write!(f, "Failed({stage}: {error})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Sizes and submits orders for one policy.
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    policy: EntryPolicy,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, policy: EntryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> EntryPolicy {
        self.policy
    }

    /// Open a position in `symbol` worth `notional_usdt`.
    ///
    /// Fetches the instrument price, sizes the quantity to the symbol's
    /// precision and sends one market order on the policy's entry side.
    pub async fn open_position(
        &self,
        symbol: &str,
        notional_usdt: f64,
        clock: ClockOffset,
    ) -> ActionOutcome {
        let price = match self.gateway.ticker_price(symbol).await {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol, error = %e, "entry aborted: price fetch failed");
                return ActionOutcome::failed(FailureStage::PriceFetch, e);
            }
        };

        // A quantity that rounds to zero is still sent; the exchange decides.
        let quantity = size_quantity(symbol, notional_usdt, price);
        if !quantity.is_finite() {
            warn!(
                symbol,
                notional_usdt,
                price,
                precision = quantity_precision(symbol),
                "entry aborted: quantity is not a number"
            );
            return ActionOutcome::failed(
                FailureStage::Sizing,
                format!("{notional_usdt} USDT at {price} sizes to {quantity}"),
            );
        }

        let side = self.policy.entry_side();
        info!(symbol, %side, quantity, price, "opening position");

        self.submit(symbol, side, quantity, clock).await
    }

    /// Flatten the account's position in `symbol`.
    ///
    /// Only a position whose sign matches the policy is closed, rounded to two
    /// decimals. A missing or opposite-signed position sends nothing.
    pub async fn close_position(&self, symbol: &str, clock: ClockOffset) -> ActionOutcome {
        let positions = match self.gateway.open_positions(clock.now_ms()).await {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol, error = %e, "close aborted: position query failed");
                return ActionOutcome::failed(FailureStage::PositionQuery, e);
            }
        };

        let held = positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.position_amt)
            .find(|amt| self.policy.holds(*amt));

        let Some(position_amt) = held else {
            debug!(symbol, policy = %self.policy, "no position to close");
            return ActionOutcome::NothingToClose;
        };

        let quantity = round_to(position_amt.abs(), CLOSE_QUANTITY_PRECISION);
        if quantity <= 0.0 {
            debug!(symbol, position_amt, "position rounds to zero, nothing to close");
            return ActionOutcome::NothingToClose;
        }

        let side = self.policy.close_side();
        info!(symbol, %side, quantity, "closing position");

        self.submit(symbol, side, quantity, clock).await
    }

    /// Whether `symbol` still holds a position in the policy's direction.
    pub async fn still_holds(&self, symbol: &str, clock: ClockOffset) -> anyhow::Result<bool> {
        let positions = self.gateway.open_positions(clock.now_ms()).await?;
        Ok(positions
            .iter()
            .any(|p| p.symbol == symbol && self.policy.holds(p.position_amt)))
    }

    async fn submit(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        clock: ClockOffset,
    ) -> ActionOutcome {
        let order = MarketOrder {
            symbol: symbol.to_string(),
            side,
            quantity,
            position_side: PositionSide::Both,
            timestamp_ms: clock.now_ms(),
        };

        match self.gateway.submit_market_order(&order).await {
            Ok(ack) => {
                info!(
                    symbol,
                    %side,
                    quantity,
                    order_id = ?ack.order_id,
                    status = ?ack.status,
                    "market order placed"
                );
                ActionOutcome::Placed { order, ack }
            }
            Err(e) => {
                warn!(symbol, %side, quantity, error = %e, "market order failed");
                ActionOutcome::failed(FailureStage::Submission, e)
            }
        }
    }
}

impl std::fmt::Debug for OrderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderExecutor")
            .field("gateway", &"<ExchangeGateway>")
            .field("policy", &self.policy)
            .finish()
    }
}
