//! # automation::wait
//!
//! Bounded poll loops. The brokerage page gives no event-driven confirmation,
//! so every wait polls at a fixed interval and gives up after a fixed timeout.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use super::driver::{AutomationError, ElementHandle, MarketUiDriver, Selector};

/// Poll interval and timeout of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(250))
    }
}

/// Poll until `selector` resolves to a visible element.
///
/// Driver errors during polling are treated as "not yet"; only the timeout
/// ends the wait.
pub async fn wait_for_visible<D>(
    driver: &D,
    selector: &Selector,
    policy: WaitPolicy,
) -> Result<ElementHandle, AutomationError>
where
    D: MarketUiDriver + ?Sized,
{
    let started = Instant::now();
    loop {
        if let Ok(Some(element)) = driver.find_element(selector).await {
            if driver.is_visible(&element).await.unwrap_or(false) {
                return Ok(element);
            }
        }

        if started.elapsed() >= policy.timeout {
            debug!(%selector, waited = ?policy.timeout, "Visibility wait timed out");
            return Err(AutomationError::Timeout {
                selector: selector.to_string(),
                waited: policy.timeout,
            });
        }
        sleep(policy.interval).await;
    }
}

/// Poll until `selector` resolves to any element, visible or not.
pub async fn wait_for_element<D>(
    driver: &D,
    selector: &Selector,
    policy: WaitPolicy,
) -> Result<ElementHandle, AutomationError>
where
    D: MarketUiDriver + ?Sized,
{
    let started = Instant::now();
    loop {
        if let Ok(Some(element)) = driver.find_element(selector).await {
            return Ok(element);
        }
        if started.elapsed() >= policy.timeout {
            return Err(AutomationError::Timeout {
                selector: selector.to_string(),
                waited: policy.timeout,
            });
        }
        sleep(policy.interval).await;
    }
}

/// Fixed delay letting the host page react to a change.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
