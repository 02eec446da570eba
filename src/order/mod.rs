//! # order
//!
//! An [`Order`] is one discrete market action (open or close) for a symbol.
//! It is created by the TradeManager, driven through the brokerage page by
//! [`execution`], and reports back exactly once through a [`Completion`]:
//! either filled (an opening fill carries the new [`Position`]) or cancelled.
//!
//! `Completion` is consumed by whichever outcome fires, so an Order cannot
//! report twice. An Order whose completion is dropped without firing stays
//! active in the TradeManager: that is the "stuck order" an operator has to
//! resolve.

pub mod execution;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::automation::MarketUiDriver;
use crate::models::{Direction, ExitReason, Position};
use crate::settings::StrategySettings;

use execution::{ExecutionConfig, ExecutionReport};

// ─── Order ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id:              Uuid,
    pub symbol:          String,
    pub direction:       Direction,
    pub strategy_id:     String,
    pub settings:        StrategySettings,
    pub quantity:        u32,
    pub instrument_id:   String,              // e.g. "QQQ-C-450"
    pub strike:          f64,
    pub is_closing:      bool,
    pub reference_price: f64,                 // underlying price at creation
    pub execution_price: Option<f64>,         // set on fill
    pub exit_reason:     Option<ExitReason>,  // closing orders only
    pub created_at:      DateTime<Utc>,
}

impl Order {
    /// Order opening a new position at the strike nearest to `reference_price`.
    pub fn opening(
        strategy_id: &str,
        settings: &StrategySettings,
        direction: Direction,
        reference_price: f64,
        quantity: u32,
        strike_increment: f64,
    ) -> Self {
        let symbol = settings.symbol.as_str().to_string();
        let strike = nearest_strike(reference_price, strike_increment);
        Self {
            id: Uuid::new_v4(),
            instrument_id: instrument_id(&symbol, direction, strike),
            symbol,
            direction,
            strategy_id: strategy_id.to_string(),
            settings: settings.clone(),
            quantity,
            strike,
            is_closing: false,
            reference_price,
            execution_price: None,
            exit_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Order closing `position`, carrying its quantity, instrument and
    /// direction.
    pub fn closing(
        position: &Position,
        settings: &StrategySettings,
        exit_reason: ExitReason,
        reference_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: position.symbol.clone(),
            direction: position.direction,
            strategy_id: position.strategy_id.clone(),
            settings: settings.clone(),
            quantity: position.quantity,
            instrument_id: position.instrument_id.clone(),
            strike: strike_of(&position.instrument_id).unwrap_or_default(),
            is_closing: true,
            reference_price,
            execution_price: None,
            exit_reason: Some(exit_reason),
            created_at: Utc::now(),
        }
    }

    /// Drive the order through the page and fire its completion.
    ///
    /// Never returns an error: the outcome is the report, and the
    /// TradeManager learns about fills and cancellations from the completion.
    pub async fn execute(
        mut self,
        driver: Arc<dyn MarketUiDriver>,
        config: Arc<ExecutionConfig>,
        completion: Completion,
    ) -> ExecutionReport {
        info!(
            order_id   = %self.id,
            symbol     = %self.symbol,
            instrument = %self.instrument_id,
            closing    = self.is_closing,
            quantity   = self.quantity,
            "🚀 [ORDER] Executing"
        );

        let report = execution::execute(&self, driver.as_ref(), &config).await;

        if report.success {
            let price = report.fill_price.unwrap_or(self.reference_price);
            self.execution_price = Some(price);
            let position = (!self.is_closing).then(|| {
                Position::open(
                    self.symbol.clone(),
                    self.instrument_id.clone(),
                    self.direction,
                    price,
                    self.quantity,
                    self.strategy_id.clone(),
                )
            });
            completion.filled(self, position);
        } else if !report.submitted {
            completion.cancelled(report.error.clone().unwrap_or_default());
        } else {
            warn!(
                order_id = %self.id,
                error    = ?report.error,
                "⚠️ [ORDER] Submission state unknown — order left active, needs manual check"
            );
        }

        report
    }
}

/// Strike on the `increment` grid nearest to `price`.
pub fn nearest_strike(price: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return price;
    }
    (price / increment).round() * increment
}

/// Strike as shown in the options chain: whole strikes without decimals.
pub fn format_strike(strike: f64) -> String {
    if strike.fract() == 0.0 {
        format!("{strike:.0}")
    } else {
        format!("{strike:.2}")
    }
}

pub fn instrument_id(symbol: &str, direction: Direction, strike: f64) -> String {
    format!("{symbol}-{}-{}", direction.option_code(), format_strike(strike))
}

fn strike_of(instrument_id: &str) -> Option<f64> {
    instrument_id.rsplit('-').next()?.parse().ok()
}

// ─── Outcome events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    /// `position` is `Some` for an opening fill and `None` for a closing one.
    Filled { order: Order, position: Option<Position> },
    Cancelled { order_id: Uuid, reason: String },
}

/// One-shot reporter handed to an executing Order.
#[derive(Debug)]
pub struct Completion {
    order_id: Uuid,
    events:   mpsc::UnboundedSender<OrderEvent>,
}

impl Completion {
    pub fn new(order_id: Uuid, events: mpsc::UnboundedSender<OrderEvent>) -> Self {
        Self { order_id, events }
    }

    pub fn filled(self, order: Order, position: Option<Position>) {
        info!(order_id = %self.order_id, opening = position.is_some(), "✅ [ORDER] Filled");
        let _ = self.events.send(OrderEvent::Filled { order, position });
    }

    pub fn cancelled(self, reason: String) {
        warn!(order_id = %self.order_id, reason = %reason, "❌ [ORDER] Cancelled");
        let _ = self.events.send(OrderEvent::Cancelled { order_id: self.order_id, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{PageAction, ScriptedDriver};
    use std::time::Duration;

    fn config() -> Arc<ExecutionConfig> {
        Arc::new(ExecutionConfig {
            wait: crate::automation::WaitPolicy::new(Duration::from_secs(1), Duration::from_millis(100)),
            settle_delay: Duration::from_millis(50),
            ..ExecutionConfig::default()
        })
    }

    fn opening() -> Order {
        Order::opening("s1", &StrategySettings::default(), Direction::Long, 450.3, 2, 1.0)
    }

    #[test]
    fn strikes_and_instruments() {
        assert_eq!(nearest_strike(450.3, 1.0), 450.0);
        assert_eq!(nearest_strike(450.3, 2.5), 450.0);
        assert_eq!(nearest_strike(451.3, 2.5), 452.5);
        assert_eq!(instrument_id("QQQ", Direction::Short, 452.5), "QQQ-P-452.50");
        assert_eq!(opening().instrument_id, "QQQ-C-450");
        assert_eq!(strike_of("QQQ-P-452.50"), Some(452.5));
    }

    #[test]
    fn closing_order_carries_position_fields() {
        let position = Position::open("QQQ", "QQQ-P-440", Direction::Short, 3.1, 4, "s9");
        let order = Order::closing(&position, &StrategySettings::default(), ExitReason::TrailingStop, 441.0);
        assert!(order.is_closing);
        assert_eq!(order.quantity, 4);
        assert_eq!(order.instrument_id, "QQQ-P-440");
        assert_eq!(order.direction, Direction::Short);
        assert_eq!(order.strategy_id, "s9");
        assert_eq!(order.strike, 440.0);
        assert_eq!(order.exit_reason, Some(ExitReason::TrailingStop));
    }

    #[tokio::test(start_paused = true)]
    async fn opening_fill_carries_position_at_fill_price() {
        let page = Arc::new(ScriptedDriver::new());
        let cfg = config();
        page.set_text(&cfg.selectors.fill_price, "$2.45");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let order = opening();
        let id = order.id;

        let report = order.execute(page.clone(), cfg, Completion::new(id, tx)).await;
        assert!(report.success);

        match rx.try_recv().unwrap() {
            OrderEvent::Filled { order, position: Some(position) } => {
                assert_eq!(order.id, id);
                assert_eq!(order.execution_price, Some(2.45));
                assert_eq!(position.entry_price, 2.45);
                assert_eq!(position.instrument_id, "QQQ-C-450");
                assert_eq!(position.quantity, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_before_submission_cancels() {
        let page = Arc::new(ScriptedDriver::new());
        let cfg = config();
        page.hide(&cfg.selectors.options_chain);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let order = opening();
        let id = order.id;

        let report = order.execute(page.clone(), cfg, Completion::new(id, tx)).await;
        assert!(!report.success);
        assert!(!report.submitted);
        assert!(matches!(rx.try_recv().unwrap(), OrderEvent::Cancelled { order_id, .. } if order_id == id));
        assert!(!page.actions().iter().any(|a| matches!(a, PageAction::SetValue(..))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_confirm_click_leaves_order_unresolved() {
        let page = Arc::new(ScriptedDriver::new());
        let cfg = config();
        page.fail_clicks_on(&cfg.selectors.confirm_button);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let order = opening();
        let id = order.id;

        let report = order.execute(page, cfg, Completion::new(id, tx)).await;
        assert!(!report.success);
        assert!(report.submitted);
        assert!(rx.try_recv().is_err(), "no outcome may fire when submission is unknown");
    }
}
