// =============================================================================
// Trigger Evaluator — pure entry / exit decisions
// =============================================================================
//
// Given the reference price, a trigger snapshot, the set of symbols already
// acted on and the active policy, decide which symbols to enter and whether
// to close everything. Nothing here touches the exchange or mutates its
// inputs; the run loop owns the triggered set and applies the decision.
//
// Comparisons are exact against the polled price. There is no hysteresis.
// =============================================================================

use crate::trigger_config::TriggerSnapshot;
use crate::types::EntryPolicy;

// ---------------------------------------------------------------------------
// Triggered set
// ---------------------------------------------------------------------------

/// Symbols already entered during this run, in the order they were entered.
///
/// Grows monotonically; a symbol is never removed, so it is entered at most
/// once per process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggeredSet {
    symbols: Vec<String>,
}

impl TriggeredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Record `symbol`; returns `false` if it was already present.
    pub fn insert(&mut self, symbol: impl Into<String>) -> bool {
        let symbol = symbol.into();
        if self.contains(&symbol) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Open a position in `symbol` sized at `notional_usdt`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAction {
    pub symbol: String,
    pub notional_usdt: f64,
    pub price_level: i64,
}

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    /// New entries, ascending by level, at most one per symbol.
    pub entries: Vec<EntryAction>,
    /// Exit level crossed while something is held.
    pub close_all: bool,
}

/// Evaluate `snapshot` against `price` for the given policy.
pub fn evaluate(
    policy: EntryPolicy,
    price: f64,
    snapshot: &TriggerSnapshot,
    triggered: &TriggeredSet,
) -> Decision {
    let mut entries: Vec<EntryAction> = Vec::new();

    for level in &snapshot.levels {
        if !policy.entry_crossed(price, level.price_level as f64) {
            continue;
        }
        // Two levels may name the same symbol; only the first crossing one
        // enters.
        if triggered.contains(&level.symbol) || entries.iter().any(|e| e.symbol == level.symbol) {
            continue;
        }
        entries.push(EntryAction {
            symbol: level.symbol.clone(),
            notional_usdt: level.notional_usdt,
            price_level: level.price_level,
        });
    }

    Decision {
        entries,
        close_all: should_close_all(policy, price, snapshot.exit_level, triggered),
    }
}

/// Exit crossed and at least one symbol has been entered.
pub fn should_close_all(
    policy: EntryPolicy,
    price: f64,
    exit_level: f64,
    triggered: &TriggeredSet,
) -> bool {
    !triggered.is_empty() && policy.exit_crossed(price, exit_level)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger_config::TriggerLevel;

    fn snapshot(levels: &[(i64, &str, f64)], exit_level: f64) -> TriggerSnapshot {
        TriggerSnapshot {
            levels: levels
                .iter()
                .map(|(price_level, symbol, notional_usdt)| TriggerLevel {
                    price_level: *price_level,
                    symbol: symbol.to_string(),
                    notional_usdt: *notional_usdt,
                })
                .collect(),
            exit_level,
        }
    }

    fn symbols(d: &Decision) -> Vec<&str> {
        d.entries.iter().map(|e| e.symbol.as_str()).collect()
    }

    #[test]
    fn long_entry_at_or_below_level() {
        let snap = snapshot(&[(30_000, "XRPUSDT", 6.0)], 35_000.0);
        let empty = TriggeredSet::new();

        let above = evaluate(EntryPolicy::Long, 30_500.0, &snap, &empty);
        assert!(above.entries.is_empty());
        assert!(!above.close_all);

        let below = evaluate(EntryPolicy::Long, 29_900.0, &snap, &empty);
        assert_eq!(
            below.entries,
            vec![EntryAction {
                symbol: "XRPUSDT".into(),
                notional_usdt: 6.0,
                price_level: 30_000,
            }]
        );

        let equal = evaluate(EntryPolicy::Long, 30_000.0, &snap, &empty);
        assert_eq!(symbols(&equal), vec!["XRPUSDT"]);
    }

    #[test]
    fn short_entry_at_or_above_level() {
        let snap = snapshot(&[(110_000, "LINKUSDT", 8.0)], 100_000.0);
        let empty = TriggeredSet::new();

        assert!(evaluate(EntryPolicy::Short, 109_999.0, &snap, &empty)
            .entries
            .is_empty());
        assert_eq!(
            symbols(&evaluate(EntryPolicy::Short, 110_000.0, &snap, &empty)),
            vec!["LINKUSDT"]
        );
    }

    #[test]
    fn triggered_symbol_is_not_entered_again() {
        let snap = snapshot(&[(30_000, "XRPUSDT", 6.0)], 35_000.0);
        let mut triggered = TriggeredSet::new();
        triggered.insert("XRPUSDT");

        for price in [29_000.0, 30_000.0, 31_000.0] {
            assert!(evaluate(EntryPolicy::Long, price, &snap, &triggered)
                .entries
                .is_empty());
        }
    }

    #[test]
    fn same_symbol_on_two_levels_enters_once() {
        let snap = snapshot(&[(29_000, "XRPUSDT", 6.0), (30_000, "XRPUSDT", 9.0)], 35_000.0);
        let d = evaluate(EntryPolicy::Long, 28_000.0, &snap, &TriggeredSet::new());
        assert_eq!(d.entries.len(), 1);
        assert_eq!(d.entries[0].price_level, 29_000);
    }

    #[test]
    fn several_levels_cross_at_once() {
        let snap = snapshot(
            &[
                (100_677, "DOGEUSDT", 6.0),
                (100_679, "ADAUSDT", 6.0),
                (101_680, "XRPUSDT", 6.0),
            ],
            104_685.0,
        );
        let d = evaluate(EntryPolicy::Long, 100_678.0, &snap, &TriggeredSet::new());
        assert_eq!(symbols(&d), vec!["ADAUSDT", "XRPUSDT"]);
    }

    #[test]
    fn close_all_requires_a_triggered_symbol() {
        let snap = snapshot(&[(30_000, "XRPUSDT", 6.0)], 35_000.0);
        let empty = TriggeredSet::new();
        assert!(!evaluate(EntryPolicy::Long, 50_000.0, &snap, &empty).close_all);

        let mut triggered = TriggeredSet::new();
        triggered.insert("XRPUSDT");
        assert!(evaluate(EntryPolicy::Long, 35_000.0, &snap, &triggered).close_all);
        assert!(!evaluate(EntryPolicy::Long, 34_999.0, &snap, &triggered).close_all);
    }

    #[test]
    fn short_close_all_below_exit() {
        let mut triggered = TriggeredSet::new();
        triggered.insert("TRXUSDT");
        assert!(should_close_all(EntryPolicy::Short, 95_000.0, 96_000.0, &triggered));
        assert!(!should_close_all(EntryPolicy::Short, 97_000.0, 96_000.0, &triggered));
        assert!(!should_close_all(EntryPolicy::Short, 95_000.0, 96_000.0, &TriggeredSet::new()));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let snap = snapshot(&[(30_000, "XRPUSDT", 6.0), (29_000, "ADAUSDT", 6.0)], 35_000.0);
        let mut triggered = TriggeredSet::new();
        triggered.insert("ADAUSDT");
        let before = triggered.clone();

        let a = evaluate(EntryPolicy::Long, 28_500.0, &snap, &triggered);
        let b = evaluate(EntryPolicy::Long, 28_500.0, &snap, &triggered);
        assert_eq!(a, b);
        assert_eq!(triggered, before);
    }

    #[test]
    fn triggered_set_keeps_insertion_order() {
        let mut set = TriggeredSet::new();
        assert!(set.insert("DOGEUSDT"));
        assert!(set.insert("ADAUSDT"));
        assert!(!set.insert("DOGEUSDT"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["DOGEUSDT", "ADAUSDT"]);
    }
}
