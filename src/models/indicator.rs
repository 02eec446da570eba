//! # models::indicator
//!
//! Defines [`IndicatorTick`], the per-symbol record pushed by the indicator
//! feed, and [`MarketSnapshot`], the paired view (trading symbol +
//! confirmation symbol) that a Strategy evaluates on every tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TradeSymbol;

// ─── IndicatorTick ────────────────────────────────────────────────────────────

/// One update from the indicator feed for a single symbol.
///
/// `cumulative_flow` is keyed by the rolling-window length, so a feed that
/// publishes `cumulativeFlow8` lands under key `8`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorTick {
    pub symbol: TradeSymbol,

    /// Last traded price of the underlying.
    pub price: f64,

    /// Net call premium flow for the current period.
    pub call_flow: f64,

    /// Net put premium flow for the current period.
    pub put_flow: f64,

    /// Rolling cumulative flow per window length.
    #[serde(default)]
    pub cumulative_flow: BTreeMap<u32, f64>,

    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

impl IndicatorTick {
    /// Cumulative flow for `period`, or `0.0` when the feed has not published
    /// that window yet.
    #[inline]
    pub fn cumulative(&self, period: u32) -> f64 {
        self.cumulative_flow.get(&period).copied().unwrap_or(0.0)
    }
}

// ─── MarketSnapshot ───────────────────────────────────────────────────────────

/// The latest tick of the trading symbol together with the latest tick of
/// its confirmation symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub primary: IndicatorTick,
    pub confirmation: IndicatorTick,
}

impl MarketSnapshot {
    /// Snapshot for a `symbol` pair, picking whichever tick belongs to the
    /// trading symbol. Returns `None` if neither side matches.
    pub fn for_symbol(symbol: TradeSymbol, a: &IndicatorTick, b: &IndicatorTick) -> Option<Self> {
        if a.symbol == symbol && b.symbol == symbol.confirmation() {
            Some(Self { primary: a.clone(), confirmation: b.clone() })
        } else if b.symbol == symbol && a.symbol == symbol.confirmation() {
            Some(Self { primary: b.clone(), confirmation: a.clone() })
        } else {
            None
        }
    }

    #[inline]
    pub fn price(&self) -> f64 {
        self.primary.price
    }

    /// `(primary, confirmation)` cumulative flow for `period`.
    #[inline]
    pub fn cumulative(&self, period: u32) -> (f64, f64) {
        (self.primary.cumulative(period), self.confirmation.cumulative(period))
    }
}
