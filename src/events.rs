//! # events
//!
//! Defines [`MonitorEvent`], every event pushed to dashboard websocket
//! clients.
//!
//! Events travel over a `tokio::sync::broadcast::Sender<String>` already
//! serialized to JSON, so slow clients never hold clones of domain types.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Position, Signal};
use crate::order::Order;
use crate::settings::StrategySettings;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorEvent {
    /// A new Strategy became the one accepting entries.
    StrategyActivated {
        strategy_id: String,
        settings: Box<StrategySettings>,
    },

    /// A Strategy opened or closed its position intent.
    SignalEmitted {
        strategy_id: String,
        signal: Signal,
        price: f64,
    },

    /// Order created and handed to the page automation.
    OrderPlaced {
        order: Box<Order>,
    },

    OrderFilled {
        order: Box<Order>,
    },

    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },

    PositionOpened {
        position: Box<Position>,
    },

    PositionClosed {
        position: Box<Position>,
        pnl: Option<f64>,
    },

    /// Session reset finished; the book is empty.
    SessionReset {
        strategy_id: String,
    },
}

impl MonitorEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

/// Broadcast `event` to every connected client. No receivers is not an error
/// (headless mode).
pub fn publish(tx: &broadcast::Sender<String>, event: &MonitorEvent) {
    let _ = tx.send(event.to_json());
}
