// =============================================================================
// Quantity precision — decimal places the exchange accepts per instrument
// =============================================================================

/// Precision used for symbols missing from [`QUANTITY_PRECISION`].
pub const DEFAULT_QUANTITY_PRECISION: u32 = 2;

/// Decimal places used when flattening a position, regardless of symbol.
pub const CLOSE_QUANTITY_PRECISION: u32 = 2;

/// Order-quantity precision for the instruments the agent trades.
pub const QUANTITY_PRECISION: &[(&str, u32)] = &[
    ("XRPUSDT", 1),
    ("ADAUSDT", 0),
    ("DOGEUSDT", 0),
    ("SUIUSDT", 1),
    ("LINKUSDT", 1),
    ("TRXUSDT", 0),
    ("PEPEUSDT", 0),
    ("AVAXUSDT", 1),
    ("DOTUSDT", 1),
    ("LTCUSDT", 1),
];

/// Decimal places for `symbol`'s order quantity.
pub fn quantity_precision(symbol: &str) -> u32 {
    QUANTITY_PRECISION
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_QUANTITY_PRECISION)
}

/// Round `value` to `decimals` places, exact halves to the even digit.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// Size a notional USDT amount into an instrument quantity.
pub fn size_quantity(symbol: &str, notional_usdt: f64, price: f64) -> f64 {
    round_to(notional_usdt / price, quantity_precision(symbol))
}
