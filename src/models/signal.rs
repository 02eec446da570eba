//! # models::signal
//!
//! Small value types shared by the Strategy, Orders and Positions.

use serde::{Deserialize, Serialize};

// ─── Direction ────────────────────────────────────────────────────────────────

/// Market direction of a trade. LONG buys calls, SHORT buys puts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Option contract type traded for this direction.
    #[inline]
    pub fn option_code(self) -> char {
        match self {
            Direction::Long => 'C',
            Direction::Short => 'P',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ExitReason ───────────────────────────────────────────────────────────────

/// Why a position intent (and its real position) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    #[default]
    None,
    TakeProfit,
    TrailingStop,
    FlowThreshold,
    CumulativeFlow,
    /// Closed by an operator or a session reset rather than a rule.
    Manual,
}

// ─── Signal ───────────────────────────────────────────────────────────────────

/// Per-tick decision of a Strategy.
///
/// Opening LONG or closing SHORT is a `Buy`; opening SHORT or closing LONG is
/// a `Sell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn for_open(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::Buy,
            Direction::Short => Signal::Sell,
        }
    }

    pub fn for_close(direction: Direction) -> Self {
        Self::for_open(direction.opposite())
    }
}
