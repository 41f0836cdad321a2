// =============================================================================
// Shared types used across the level-trigger agent
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Crossing direction for entry and exit levels.
///
/// Exactly one policy is active per process; it is chosen once at startup and
/// never re-evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPolicy {
    /// Buy when the reference drops to a level, sell everything when it rises
    /// to the exit level.
    #[default]
    Long,
    /// Short when the reference rises to a level, cover everything when it
    /// falls to the exit level.
    Short,
}

impl EntryPolicy {
    /// Whether `price` has crossed an entry `level`.
    pub fn entry_crossed(self, price: f64, level: f64) -> bool {
        match self {
            Self::Long => price <= level,
            Self::Short => price >= level,
        }
    }

    /// Whether `price` has crossed the shared exit level.
    pub fn exit_crossed(self, price: f64, exit_level: f64) -> bool {
        match self {
            Self::Long => price >= exit_level,
            Self::Short => price <= exit_level,
        }
    }

    /// Order side that opens a position under this policy.
    pub fn entry_side(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position opened under this policy.
    pub fn close_side(self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// Whether a signed exchange position amount is a holding this policy
    /// opened (positive for long, negative for short).
    pub fn holds(self, position_amt: f64) -> bool {
        match self {
            Self::Long => position_amt > 0.0,
            Self::Short => position_amt < 0.0,
        }
    }
}

impl std::fmt::Display for EntryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

impl FromStr for EntryPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            other => anyhow::bail!("unknown entry policy '{other}' (expected 'long' or 'short')"),
        }
    }
}

/// Market order direction as the exchange spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Futures position mode attached to every order. The agent always trades in
/// one-way mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    #[default]
    Both,
}

impl PositionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Both => "BOTH",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
