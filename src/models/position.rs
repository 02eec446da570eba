//! # models::position
//!
//! A [`Position`] is the record of a real trade that the brokerage UI has
//! confirmed. It is created by an opening Order fill and closed exactly once
//! by the matching closing Order fill.
//!
//! ## Why separate from the Strategy's position intent?
//! The intent is the Strategy's own bookkeeping and exists before any Order is
//! placed. A `Position` only exists once the page confirmed the fill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Direction, ExitReason};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    /// Option contract identifier, e.g. `QQQ-C-450`.
    pub instrument_id: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: u32,
    pub entry_time: DateTime<Utc>,
    /// Strategy that produced the opening signal.
    pub strategy_id: String,

    // ── Set once by `close()` ────────────────────────────────────────────────
    pub close_price: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        instrument_id: impl Into<String>,
        direction: Direction,
        entry_price: f64,
        quantity: u32,
        strategy_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            instrument_id: instrument_id.into(),
            direction,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            strategy_id: strategy_id.into(),
            close_price: None,
            close_time: None,
            exit_reason: None,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.close_time.is_none()
    }

    /// Close the position. A second call is a no-op and keeps the values set
    /// by the first one.
    pub fn close(&mut self, reason: ExitReason, price: f64) {
        if !self.is_open() {
            return;
        }
        self.close_price = Some(price);
        self.close_time = Some(Utc::now());
        self.exit_reason = Some(reason);
    }

    /// Realised PnL in price units, `None` while open.
    pub fn pnl(&self) -> Option<f64> {
        let close = self.close_price?;
        let qty = f64::from(self.quantity);
        Some(match self.direction {
            Direction::Long => (close - self.entry_price) * qty,
            Direction::Short => (self.entry_price - close) * qty,
        })
    }

    /// Unrealised PnL at `current_price` (used by the dashboard).
    pub fn unrealised_pnl(&self, current_price: f64) -> f64 {
        let qty = f64::from(self.quantity);
        match self.direction {
            Direction::Long => (current_price - self.entry_price) * qty,
            Direction::Short => (self.entry_price - current_price) * qty,
        }
    }
}
