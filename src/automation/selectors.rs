//! # automation::selectors
//!
//! Every selector the order-execution procedure uses, in one place.
//!
//! The brokerage front-end changes its markup without notice, so the defaults
//! can be overridden by a JSON file (`BROKER_SELECTORS`) with the same field
//! names. Missing fields keep their defaults.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::driver::Selector;
use crate::models::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerSelectors {
    // ── Ticket toggles ───────────────────────────────────────────────────────
    pub buy_toggle: String,
    pub sell_toggle: String,
    pub call_toggle: String,
    pub put_toggle: String,

    // ── Options chain (opening orders) ───────────────────────────────────────
    pub options_chain: String,
    /// Base selector of one chain row; narrowed by `:has-text(strike)`.
    /// Clicking the row selects the contract.
    pub chain_row: String,

    // ── Positions panel (closing orders) ─────────────────────────────────────
    /// Base selector of one open-position row; narrowed by `position_label`.
    pub position_row: String,
    /// How the panel labels a contract. `{symbol}`, `{strike}` and `{type}`
    /// are substituted; the row text must contain these tokens in order.
    pub position_label: String,
    pub call_label: String,
    pub put_label: String,
    /// Ticket control that turns the selected position into a closing order.
    pub close_position_button: String,

    // ── Ticket ───────────────────────────────────────────────────────────────
    pub quantity_input: String,
    pub review_button: String,
    pub confirm_button: String,
    /// Text element showing the average fill price after confirmation.
    pub fill_price: String,
}

impl Default for BrokerSelectors {
    fn default() -> Self {
        Self {
            buy_toggle: "[data-testid=order-action-buy]".into(),
            sell_toggle: "[data-testid=order-action-sell]".into(),
            call_toggle: "[data-testid=option-type-call]".into(),
            put_toggle: "[data-testid=option-type-put]".into(),
            options_chain: "[data-testid=options-chain-grid]".into(),
            chain_row: "[data-testid=options-chain-row]".into(),
            position_row: "[data-testid=positions-row]".into(),
            position_label: "{symbol} {strike} {type}".into(),
            call_label: "Call".into(),
            put_label: "Put".into(),
            close_position_button: "button:has-text(\"Close position\")".into(),
            quantity_input: "input[name=quantity]".into(),
            review_button: "button:has-text(\"Review order\")".into(),
            confirm_button: "button:has-text(\"Place order\")".into(),
            fill_price: "[data-testid=order-fill-price]".into(),
        }
    }
}

impl BrokerSelectors {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selectors file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid selectors JSON in {}", path.display()))
    }

    pub fn action_toggle(&self, closing: bool) -> Selector {
        Selector::new(if closing { &self.sell_toggle } else { &self.buy_toggle })
    }

    pub fn option_type_toggle(&self, direction: Direction) -> Selector {
        Selector::new(match direction {
            Direction::Long => &self.call_toggle,
            Direction::Short => &self.put_toggle,
        })
    }

    pub fn chain_row_for_strike(&self, strike: &str) -> Selector {
        Selector::with_text(&self.chain_row, strike)
    }

    /// Label of the `symbol` / `strike` contract, e.g. `QQQ 450 Call`.
    pub fn position_label_for(&self, symbol: &str, strike: &str, direction: Direction) -> String {
        let option_type = match direction {
            Direction::Long => &self.call_label,
            Direction::Short => &self.put_label,
        };
        self.position_label
            .replace("{symbol}", symbol)
            .replace("{strike}", strike)
            .replace("{type}", option_type)
    }

    pub fn position_row_for(&self, symbol: &str, strike: &str, direction: Direction) -> Selector {
        Selector::with_text(&self.position_row, &self.position_label_for(symbol, strike, direction))
    }
}
