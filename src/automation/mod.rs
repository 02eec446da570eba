//! # automation
//!
//! Everything that touches the brokerage page: the [`MarketUiDriver`] seam,
//! bounded waits, the selector catalogue and the two driver implementations
//! (W3C WebDriver for a real browser, scripted page for paper mode and tests).

pub mod driver;
pub mod scripted;
pub mod selectors;
pub mod wait;
pub mod webdriver;

pub use driver::{AutomationError, DriverError, ElementHandle, MarketUiDriver, Selector};
pub use scripted::{PageAction, ScriptedDriver};
pub use selectors::BrokerSelectors;
pub use wait::WaitPolicy;
pub use webdriver::WebDriverUi;
