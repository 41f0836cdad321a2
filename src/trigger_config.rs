// =============================================================================
// Trigger Configuration — entry levels and the shared exit level
// =============================================================================
//
// The trigger file is re-read on every polling cycle so an operator can edit
// levels while the agent runs. Each read yields an immutable snapshot; the
// evaluator never sees a half-edited file because a parse failure returns an
// error for the whole cycle.
//
// File layout:
//
//   {
//     "buy_triggers": { "30000": ["XRPUSDT", 6], "29500": ["ADAUSDT", 6] },
//     "sell_trigger": 35000
//   }
//
// Keys are string-encoded integer price levels. Values are
// `[symbol, notional_usdt]`. `sell_trigger` may be a number or a numeric
// string.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// One entry level: open `symbol` for `notional_usdt` once the reference
/// price crosses `price_level`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerLevel {
    pub price_level: i64,
    pub symbol: String,
    pub notional_usdt: f64,
}

/// Immutable view of the trigger file at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSnapshot {
    /// Entry levels, ascending by `price_level` rather than file order. When
    /// one symbol appears under several levels, the lowest level that crosses
    /// is the one entered, with its notional.
    pub levels: Vec<TriggerLevel>,
    /// Price at which every open position is closed.
    pub exit_level: f64,
}

/// Supplies a fresh [`TriggerSnapshot`] each time it is asked.
pub trait TriggerSource {
    fn snapshot(&self) -> Result<TriggerSnapshot>;
}

// -----------------------------------------------------------------------------
// JSON file source
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTriggerFile {
    buy_triggers: BTreeMap<String, (String, f64)>,
    #[serde(default)]
    sell_trigger: Option<serde_json::Value>,
}

impl TriggerSnapshot {
    /// Parse a trigger document.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawTriggerFile =
            serde_json::from_str(content).context("trigger file is not valid JSON")?;

        // Numeric keys, last duplicate wins.
        let mut by_level: BTreeMap<i64, (String, f64)> = BTreeMap::new();
        for (key, (symbol, notional_usdt)) in raw.buy_triggers {
            let level: i64 = key
                .trim()
                .parse()
                .with_context(|| format!("trigger level '{key}' is not an integer"))?;
            by_level.insert(level, (symbol, notional_usdt));
        }

        let levels = by_level
            .into_iter()
            .map(|(price_level, (symbol, notional_usdt))| TriggerLevel {
                price_level,
                symbol,
                notional_usdt,
            })
            .collect();

        let sell_trigger = raw.sell_trigger.context("trigger file has no sell_trigger")?;
        let exit_level = coerce_level(&sell_trigger)
            .with_context(|| format!("sell_trigger {sell_trigger} is not a number"))?;

        Ok(Self { levels, exit_level })
    }
}

fn coerce_level(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads the trigger file from disk on every call.
#[derive(Debug, Clone)]
pub struct JsonFileTriggerSource {
    path: PathBuf,
}

impl JsonFileTriggerSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TriggerSource for JsonFileTriggerSource {
    fn snapshot(&self) -> Result<TriggerSnapshot> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read trigger file {}", self.path.display()))?;

        let snapshot = TriggerSnapshot::from_json(&content)
            .with_context(|| format!("failed to parse trigger file {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            levels = snapshot.levels.len(),
            exit_level = snapshot.exit_level,
            "trigger file loaded"
        );
        Ok(snapshot)
    }
}

/// Fixed snapshot, used where the levels are known up front.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct StaticTriggerSource(pub TriggerSnapshot);

#[cfg(test)]
impl TriggerSource for StaticTriggerSource {
    fn snapshot(&self) -> Result<TriggerSnapshot> {
        Ok(self.0.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_levels_sorted_numerically() {
        let json = r#"{
            "buy_triggers": {
                "101680": ["XRPUSDT", 6],
                "99000":  ["ADAUSDT", 7.5],
                "100677": ["DOGEUSDT", 6]
            },
            "sell_trigger": 104685
        }"#;
        let snap = TriggerSnapshot::from_json(json).unwrap();
        let levels: Vec<i64> = snap.levels.iter().map(|l| l.price_level).collect();
        assert_eq!(levels, vec![99_000, 100_677, 101_680]);
        assert_eq!(snap.levels[0].symbol, "ADAUSDT");
        assert!((snap.levels[0].notional_usdt - 7.5).abs() < f64::EPSILON);
        assert!((snap.exit_level - 104_685.0).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_symbol_keeps_every_level_in_price_order() {
        let json = r#"{
            "buy_triggers": { "30000": ["XRPUSDT", 9], "29000": ["XRPUSDT", 6] },
            "sell_trigger": 35000
        }"#;
        let snap = TriggerSnapshot::from_json(json).unwrap();
        let levels: Vec<(i64, f64)> = snap
            .levels
            .iter()
            .map(|l| (l.price_level, l.notional_usdt))
            .collect();
        assert_eq!(levels, vec![(29_000, 6.0), (30_000, 9.0)]);
    }

    #[test]
    fn sell_trigger_accepts_numeric_string() {
        let json = r#"{ "buy_triggers": {}, "sell_trigger": "35000" }"#;
        let snap = TriggerSnapshot::from_json(json).unwrap();
        assert!(snap.levels.is_empty());
        assert!((snap.exit_level - 35_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_numeric_keys_keep_last() {
        let json = r#"{
            "buy_triggers": { "030000": ["XRPUSDT", 6], "30000": ["ADAUSDT", 6] },
            "sell_trigger": 35000
        }"#;
        let snap = TriggerSnapshot::from_json(json).unwrap();
        assert_eq!(snap.levels.len(), 1);
        assert_eq!(snap.levels[0].price_level, 30_000);
        assert_eq!(snap.levels[0].symbol, "ADAUSDT");
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(TriggerSnapshot::from_json("not json").is_err());
        assert!(TriggerSnapshot::from_json(
            r#"{ "buy_triggers": { "abc": ["XRPUSDT", 6] }, "sell_trigger": 1 }"#
        )
        .is_err());
        assert!(TriggerSnapshot::from_json(
            r#"{ "buy_triggers": { "1": ["XRPUSDT"] }, "sell_trigger": 1 }"#
        )
        .is_err());
        assert!(TriggerSnapshot::from_json(
            r#"{ "buy_triggers": {}, "sell_trigger": [1] }"#
        )
        .is_err());
        assert!(TriggerSnapshot::from_json(r#"{ "buy_triggers": {} }"#).is_err());
    }

    #[test]
    fn file_source_rereads_on_every_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "buy_triggers": {{ "30000": ["XRPUSDT", 6] }}, "sell_trigger": 35000 }}"#
        )
        .unwrap();
        file.flush().unwrap();

        let source = JsonFileTriggerSource::new(file.path());
        let first = source.snapshot().unwrap();
        assert_eq!(first.levels.len(), 1);

        std::fs::write(
            file.path(),
            r#"{ "buy_triggers": { "30000": ["XRPUSDT", 6], "29000": ["LTCUSDT", 10] }, "sell_trigger": 36000 }"#,
        )
        .unwrap();
        let second = source.snapshot().unwrap();
        assert_eq!(second.levels.len(), 2);
        assert!((second.exit_level - 36_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_names_the_path() {
        let source = JsonFileTriggerSource::new("/definitely/not/here.json");
        let err = source.snapshot().unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
