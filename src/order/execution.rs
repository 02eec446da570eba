//! # order::execution
//!
//! Drives one [`Order`] through the brokerage order ticket.
//!
//! ## Flow
//! ```text
//! action toggle ─► option-type toggle ─► contract ─► quantity ─► review ─► confirm ─► fill price
//!                                          │
//!                     opening: chain row for the strike
//!                     closing: positions row by contract label + "close position"
//! ```
//!
//! Every step either succeeds or returns an [`AutomationError`]. The outcome is
//! folded into an [`ExecutionReport`] that records whether the confirm click
//! was attempted, because a failure there leaves the submission state unknown.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use super::{format_strike, Order};
use crate::automation::{
    wait, AutomationError, BrokerSelectors, MarketUiDriver, Selector, WaitPolicy,
};

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub selectors:    BrokerSelectors,
    pub wait:         WaitPolicy,
    pub settle_delay: Duration,   // pause after the quantity so the ticket recomputes
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            selectors: BrokerSelectors::default(),
            wait: WaitPolicy::default(),
            settle_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub success:    bool,
    pub message:    Option<String>,
    pub error:      Option<String>,
    pub submitted:  bool,          // confirm click attempted
    pub fill_price: Option<f64>,   // as read from the ticket, if shown
}

impl ExecutionReport {
    fn filled(fill_price: Option<f64>) -> Self {
        let message = match fill_price {
            Some(p) => format!("Order filled at {p:.2}"),
            None => "Order submitted; fill price not shown".to_string(),
        };
        Self { success: true, message: Some(message), error: None, submitted: true, fill_price }
    }

    fn failed(error: &AutomationError, submitted: bool) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
            submitted,
            fill_price: None,
        }
    }
}

/// Failure of a step, tagged with whether it happened at the confirm click.
struct StepFailure {
    error: AutomationError,
    submitted: bool,
}

impl From<AutomationError> for StepFailure {
    fn from(error: AutomationError) -> Self {
        Self { error, submitted: false }
    }
}

impl From<crate::automation::DriverError> for StepFailure {
    fn from(error: crate::automation::DriverError) -> Self {
        AutomationError::from(error).into()
    }
}

pub async fn execute(
    order: &Order,
    driver: &dyn MarketUiDriver,
    config: &ExecutionConfig,
) -> ExecutionReport {
    match run_steps(order, driver, config).await {
        Ok(fill_price) => {
            info!(order_id = %order.id, fill = ?fill_price, "✅ [EXEC] Order confirmed");
            ExecutionReport::filled(fill_price)
        }
        Err(StepFailure { error: e, submitted }) => {
            error!(order_id = %order.id, submitted, error = %e, "❌ [EXEC] Order execution failed");
            ExecutionReport::failed(&e, submitted)
        }
    }
}

async fn run_steps(
    order: &Order,
    driver: &dyn MarketUiDriver,
    config: &ExecutionConfig,
) -> Result<Option<f64>, StepFailure> {
    let sel = &config.selectors;

    // ── 1. Ticket toggles ───────────────────────────────────────────────────
    ensure_selected(driver, &sel.action_toggle(order.is_closing)).await?;
    ensure_selected(driver, &sel.option_type_toggle(order.direction)).await?;

    // ── 2. Contract ─────────────────────────────────────────────────────────
    let strike = format_strike(order.strike);
    if order.is_closing {
        let label = sel.position_row_for(&order.symbol, &strike, order.direction);
        let row = wait::wait_for_element(driver, &label, config.wait).await?;
        driver.scroll_into_view(&row).await?;
        driver.click(&row).await?;
        let close = driver.require(&Selector::new(&sel.close_position_button)).await?;
        driver.click(&close).await?;
    } else {
        driver.wait_for_visible(&Selector::new(&sel.options_chain), config.wait).await?;
        let row = wait::wait_for_element(driver, &sel.chain_row_for_strike(&strike), config.wait).await?;
        driver.scroll_into_view(&row).await?;
        driver.click(&row).await?;
    }
    debug!(order_id = %order.id, instrument = %order.instrument_id, "Contract selected");

    // ── 3. Quantity ─────────────────────────────────────────────────────────
    let quantity = driver.require(&Selector::new(&sel.quantity_input)).await?;
    driver.set_value(&quantity, &order.quantity.to_string()).await?;
    wait::settle(config.settle_delay).await;

    // ── 4. Review + confirm ─────────────────────────────────────────────────
    let review = driver.require(&Selector::new(&sel.review_button)).await?;
    driver.click(&review).await?;
    let confirm = driver.wait_for_visible(&Selector::new(&sel.confirm_button), config.wait).await?;
    driver.click(&confirm).await.map_err(|e| StepFailure {
        error: AutomationError::from(e),
        submitted: true,
    })?;

    // ── 5. Fill price (best effort) ─────────────────────────────────────────
    Ok(read_fill_price(driver, &Selector::new(&sel.fill_price)).await)
}

/// Click a toggle unless it is already selected.
async fn ensure_selected(driver: &dyn MarketUiDriver, selector: &Selector) -> Result<(), AutomationError> {
    let toggle = driver.require(selector).await?;
    if !driver.is_selected(&toggle).await? {
        driver.click(&toggle).await?;
    }
    Ok(())
}

async fn read_fill_price(driver: &dyn MarketUiDriver, selector: &Selector) -> Option<f64> {
    let element = driver.find_element(selector).await.ok()??;
    let text = driver.read_text(&element).await.ok()?;
    parse_price(&text)
}

fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok().filter(|p: &f64| p.is_finite() && *p > 0.0)
}
