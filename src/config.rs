//! # config — runtime configuration from environment variables
//!
//! `.env` is loaded by `main` through `dotenvy` before this runs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::automation::{BrokerSelectors, WaitPolicy};
use crate::order::execution::ExecutionConfig;
use crate::settings::StrategySettings;
use crate::trade_manager::ManagerConfig;

/// Which page the orders are executed against.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverTarget {
    /// In-process scripted page: every order fills at the reference price.
    Paper,
    /// Existing W3C WebDriver session attached to the brokerage tab.
    WebDriver { url: String, session_id: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub driver: DriverTarget,
    pub selectors: BrokerSelectors,
    /// Contracts per opening order.
    pub quantity: u32,
    pub strike_increment: f64,
    pub wait: WaitPolicy,
    pub settle_delay: Duration,
    /// Initial strategy settings (`FLOWPILOT_*`).
    pub strategy: StrategySettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.strategy = StrategySettings::from_env().context("Invalid FLOWPILOT_* strategy settings")?;
        Ok(config)
    }

    /// Build from any key lookup; strategy settings keep their defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let bind_addr: SocketAddr = get("BIND_ADDR", "0.0.0.0:3000")
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let url = get("WEBDRIVER_URL", "mock");
        let driver = if url == "mock" {
            DriverTarget::Paper
        } else {
            let session_id = var("WEBDRIVER_SESSION")
                .context("WEBDRIVER_SESSION is required when WEBDRIVER_URL is set")?;
            DriverTarget::WebDriver { url, session_id }
        };

        let selectors = match var("BROKER_SELECTORS") {
            Some(path) => BrokerSelectors::from_file(path)?,
            None => BrokerSelectors::default(),
        };

        let quantity: u32 = get("ORDER_QUANTITY", "1")
            .parse()
            .context("ORDER_QUANTITY must be a whole number")?;
        if quantity == 0 {
            bail!("ORDER_QUANTITY must be at least 1");
        }

        let strike_increment: f64 = get("STRIKE_INCREMENT", "1.0")
            .parse()
            .context("STRIKE_INCREMENT must be a number")?;
        if strike_increment <= 0.0 {
            bail!("STRIKE_INCREMENT must be positive");
        }

        let millis = |key: &str, default: &str| -> anyhow::Result<Duration> {
            let ms: u64 = get(key, default)
                .parse()
                .with_context(|| format!("{key} must be a number of milliseconds"))?;
            Ok(Duration::from_millis(ms))
        };

        Ok(Self {
            bind_addr,
            driver,
            selectors,
            quantity,
            strike_increment,
            wait: WaitPolicy::new(millis("WAIT_TIMEOUT_MS", "10000")?, millis("WAIT_POLL_MS", "250")?),
            settle_delay: millis("SETTLE_DELAY_MS", "500")?,
            strategy: StrategySettings::default(),
        })
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            quantity: self.quantity,
            strike_increment: self.strike_increment,
            execution: Arc::new(ExecutionConfig {
                selectors: self.selectors.clone(),
                wait: self.wait,
                settle_delay: self.settle_delay,
            }),
        }
    }
}
