//! # settings
//!
//! The observable bag of strategy parameters.
//!
//! [`Settings`] is a state container around a `tokio::sync::watch` channel:
//! mutators publish a new [`StrategySettings`] snapshot immediately, readers
//! either take the consolidated snapshot or a per-field [`Projection`] that
//! only wakes up when its own field changes. There is no global instance;
//! the container is created once in `main` and handed to whoever needs it.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Moving-average windows the dashboard offers.
pub const MA_PERIODS: [u32; 4] = [5, 10, 20, 50];

/// Cumulative-flow windows published by the indicator feed.
pub const CUMULATIVE_FLOW_PERIODS: [u32; 5] = [3, 5, 8, 13, 21];

// ─── Enumerated fields ────────────────────────────────────────────────────────

/// Which directions a Strategy may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyMode {
    Long,
    Short,
    TwoWay,
}

impl StrategyMode {
    pub fn allows_long(self) -> bool {
        matches!(self, StrategyMode::Long | StrategyMode::TwoWay)
    }

    pub fn allows_short(self) -> bool {
        matches!(self, StrategyMode::Short | StrategyMode::TwoWay)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyMode::Long => "LONG",
            StrategyMode::Short => "SHORT",
            StrategyMode::TwoWay => "TWO_WAY",
        }
    }
}

/// Underlyings the assistant trades. Each one is confirmed by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSymbol {
    Qqq,
    Spy,
}

impl TradeSymbol {
    /// The symbol whose flow must agree before entering a trade.
    pub fn confirmation(self) -> Self {
        match self {
            TradeSymbol::Qqq => TradeSymbol::Spy,
            TradeSymbol::Spy => TradeSymbol::Qqq,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeSymbol::Qqq => "QQQ",
            TradeSymbol::Spy => "SPY",
        }
    }
}

impl std::fmt::Display for TradeSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── StrategySettings ─────────────────────────────────────────────────────────

/// Immutable snapshot of every strategy parameter at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySettings {
    pub ma_period: u32,
    pub cumulative_flow_period: u32,
    /// Trailing-stop distance in cents. `<= 0` disables the trailing stop.
    pub stop_loss_amount: f64,
    /// Take-profit distance in cents.
    pub take_profit_amount: f64,
    pub bullish_threshold: f64,
    pub bearish_threshold: f64,
    pub widening_threshold: f64,
    pub mode: StrategyMode,
    pub symbol: TradeSymbol,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            ma_period: 20,
            cumulative_flow_period: 8,
            stop_loss_amount: 100.0,
            take_profit_amount: 70.0,
            bullish_threshold: 500.0,
            bearish_threshold: -500.0,
            widening_threshold: 250.0,
            mode: StrategyMode::TwoWay,
            symbol: TradeSymbol::Qqq,
        }
    }
}

impl StrategySettings {
    /// Defaults overridden by `FLOWPILOT_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        let d = Self::default();
        let settings = Self {
            ma_period: env_or("FLOWPILOT_MA_PERIOD", d.ma_period),
            cumulative_flow_period: env_or("FLOWPILOT_CUMULATIVE_FLOW_PERIOD", d.cumulative_flow_period),
            stop_loss_amount: env_or("FLOWPILOT_STOP_LOSS", d.stop_loss_amount),
            take_profit_amount: env_or("FLOWPILOT_TAKE_PROFIT", d.take_profit_amount),
            bullish_threshold: env_or("FLOWPILOT_BULLISH_THRESHOLD", d.bullish_threshold),
            bearish_threshold: env_or("FLOWPILOT_BEARISH_THRESHOLD", d.bearish_threshold),
            widening_threshold: env_or("FLOWPILOT_WIDENING_THRESHOLD", d.widening_threshold),
            mode: match std::env::var("FLOWPILOT_MODE").ok().as_deref() {
                Some("LONG") => StrategyMode::Long,
                Some("SHORT") => StrategyMode::Short,
                Some("TWO_WAY") | None => StrategyMode::TwoWay,
                Some(other) => return Err(SettingsError::UnknownValue("mode", other.to_string())),
            },
            symbol: match std::env::var("FLOWPILOT_SYMBOL").ok().as_deref() {
                Some("QQQ") | None => TradeSymbol::Qqq,
                Some("SPY") => TradeSymbol::Spy,
                Some(other) => return Err(SettingsError::UnknownValue("symbol", other.to_string())),
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values outside the enumerated domains.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !MA_PERIODS.contains(&self.ma_period) {
            return Err(SettingsError::OutOfDomain("maPeriod", self.ma_period));
        }
        if !CUMULATIVE_FLOW_PERIODS.contains(&self.cumulative_flow_period) {
            return Err(SettingsError::OutOfDomain("cumulativeFlowPeriod", self.cumulative_flow_period));
        }
        Ok(())
    }

    /// Deterministic identifier: identical settings produce identical ids.
    pub fn strategy_id(&self) -> String {
        format!(
            "{}-flow-ma{}-cf{}-sl{}-tp{}-bu{}-be{}-w{}-{}",
            self.symbol,
            self.ma_period,
            self.cumulative_flow_period,
            self.stop_loss_amount,
            self.take_profit_amount,
            self.bullish_threshold,
            self.bearish_threshold,
            self.widening_threshold,
            self.mode.as_str(),
        )
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Field-by-field change detection between two snapshots.
pub fn settings_changed(a: &StrategySettings, b: &StrategySettings) -> bool {
    a.ma_period != b.ma_period
        || a.cumulative_flow_period != b.cumulative_flow_period
        || a.stop_loss_amount != b.stop_loss_amount
        || a.take_profit_amount != b.take_profit_amount
        || a.bullish_threshold != b.bullish_threshold
        || a.bearish_threshold != b.bearish_threshold
        || a.widening_threshold != b.widening_threshold
        || a.mode != b.mode
        || a.symbol != b.symbol
}

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("{0} = {1} is not one of the supported values")]
    OutOfDomain(&'static str, u32),

    #[error("unknown {0}: '{1}'")]
    UnknownValue(&'static str, String),
}

// ─── Settings container ───────────────────────────────────────────────────────

/// Shared, observable settings. Cloning yields another handle to the same
/// state.
#[derive(Debug, Clone)]
pub struct Settings {
    tx: std::sync::Arc<watch::Sender<StrategySettings>>,
}

impl Settings {
    pub fn new(initial: StrategySettings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: std::sync::Arc::new(tx) }
    }

    /// Consolidated snapshot of the current values.
    pub fn snapshot(&self) -> StrategySettings {
        self.tx.borrow().clone()
    }

    /// Receiver that yields every new consolidated snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StrategySettings> {
        self.tx.subscribe()
    }

    /// Replace every field at once after validation.
    pub fn update(&self, next: StrategySettings) -> Result<(), SettingsError> {
        next.validate()?;
        self.tx.send_replace(next);
        Ok(())
    }

    // ── Projections ──────────────────────────────────────────────────────────

    pub fn ma_period(&self) -> Projection<u32> {
        Projection::new(self.subscribe(), |s| s.ma_period)
    }

    pub fn cumulative_flow_period(&self) -> Projection<u32> {
        Projection::new(self.subscribe(), |s| s.cumulative_flow_period)
    }

    pub fn stop_loss_amount(&self) -> Projection<f64> {
        Projection::new(self.subscribe(), |s| s.stop_loss_amount)
    }

    pub fn take_profit_amount(&self) -> Projection<f64> {
        Projection::new(self.subscribe(), |s| s.take_profit_amount)
    }

    pub fn bullish_threshold(&self) -> Projection<f64> {
        Projection::new(self.subscribe(), |s| s.bullish_threshold)
    }

    pub fn bearish_threshold(&self) -> Projection<f64> {
        Projection::new(self.subscribe(), |s| s.bearish_threshold)
    }

    pub fn widening_threshold(&self) -> Projection<f64> {
        Projection::new(self.subscribe(), |s| s.widening_threshold)
    }

    pub fn mode(&self) -> Projection<StrategyMode> {
        Projection::new(self.subscribe(), |s| s.mode)
    }

    pub fn symbol(&self) -> Projection<TradeSymbol> {
        Projection::new(self.subscribe(), |s| s.symbol)
    }

    // ── Mutators ─────────────────────────────────────────────────────────────

    pub fn set_ma_period(&self, period: u32) -> Result<(), SettingsError> {
        if !MA_PERIODS.contains(&period) {
            return Err(SettingsError::OutOfDomain("maPeriod", period));
        }
        self.tx.send_modify(|s| s.ma_period = period);
        Ok(())
    }

    pub fn set_cumulative_flow_period(&self, period: u32) -> Result<(), SettingsError> {
        if !CUMULATIVE_FLOW_PERIODS.contains(&period) {
            return Err(SettingsError::OutOfDomain("cumulativeFlowPeriod", period));
        }
        self.tx.send_modify(|s| s.cumulative_flow_period = period);
        Ok(())
    }

    pub fn set_stop_loss_amount(&self, amount: f64) {
        self.tx.send_modify(|s| s.stop_loss_amount = amount);
    }

    pub fn set_take_profit_amount(&self, amount: f64) {
        self.tx.send_modify(|s| s.take_profit_amount = amount);
    }

    pub fn set_bullish_threshold(&self, threshold: f64) {
        self.tx.send_modify(|s| s.bullish_threshold = threshold);
    }

    pub fn set_bearish_threshold(&self, threshold: f64) {
        self.tx.send_modify(|s| s.bearish_threshold = threshold);
    }

    pub fn set_widening_threshold(&self, threshold: f64) {
        self.tx.send_modify(|s| s.widening_threshold = threshold);
    }

    pub fn set_mode(&self, mode: StrategyMode) {
        self.tx.send_modify(|s| s.mode = mode);
    }

    pub fn set_symbol(&self, symbol: TradeSymbol) {
        self.tx.send_modify(|s| s.symbol = symbol);
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(StrategySettings::default())
    }
}

// ─── Projection ───────────────────────────────────────────────────────────────

/// Read-only view of a single settings field.
pub struct Projection<T> {
    rx: watch::Receiver<StrategySettings>,
    select: fn(&StrategySettings) -> T,
    last: T,
}

impl<T: Clone + PartialEq> Projection<T> {
    fn new(rx: watch::Receiver<StrategySettings>, select: fn(&StrategySettings) -> T) -> Self {
        let last = select(&rx.borrow());
        Self { rx, select, last }
    }

    /// Current value of the field.
    pub fn get(&self) -> T {
        (self.select)(&self.rx.borrow())
    }

    /// Wait until the field holds a value different from the one last
    /// observed, and return it. `None` once the settings container is gone.
    pub async fn changed(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            let value = (self.select)(&self.rx.borrow_and_update());
            if value != self.last {
                self.last = value.clone();
                return Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn strategy_id_is_deterministic() {
        let a = StrategySettings::default();
        let b = StrategySettings::default();
        assert_eq!(a.strategy_id(), b.strategy_id());
        assert_eq!(a.strategy_id(), "QQQ-flow-ma20-cf8-sl100-tp70-bu500-be-500-w250-TWO_WAY");

        let c = StrategySettings { take_profit_amount: 80.0, ..a.clone() };
        assert_ne!(a.strategy_id(), c.strategy_id());
    }

    #[test]
    fn change_predicate_compares_every_field() {
        let base = StrategySettings::default();
        assert!(!settings_changed(&base, &base.clone()));
        assert!(settings_changed(&base, &StrategySettings { widening_threshold: 1.0, ..base.clone() }));
        assert!(settings_changed(&base, &StrategySettings { symbol: TradeSymbol::Spy, ..base.clone() }));
        assert!(settings_changed(&base, &StrategySettings { mode: StrategyMode::Long, ..base.clone() }));
    }

    #[test]
    fn mutators_reject_out_of_domain_periods() {
        let settings = Settings::default();
        assert_eq!(
            settings.set_ma_period(7),
            Err(SettingsError::OutOfDomain("maPeriod", 7))
        );
        assert!(settings.set_cumulative_flow_period(13).is_ok());
        assert_eq!(settings.snapshot().cumulative_flow_period, 13);
        assert_eq!(settings.snapshot().ma_period, 20);
    }

    #[test]
    fn mutation_is_immediately_visible() {
        let settings = Settings::default();
        let rx = settings.subscribe();
        settings.set_bullish_threshold(750.0);
        assert_eq!(rx.borrow().bullish_threshold, 750.0);
        assert_eq!(settings.bullish_threshold().get(), 750.0);
    }

    #[tokio::test]
    async fn projection_ignores_unrelated_fields() {
        let settings = Settings::default();
        let mut stop = settings.stop_loss_amount();

        settings.set_take_profit_amount(90.0);
        let pending = tokio::time::timeout(Duration::from_millis(20), stop.changed()).await;
        assert!(pending.is_err(), "projection woke up for another field");

        settings.set_stop_loss_amount(150.0);
        assert_eq!(stop.changed().await, Some(150.0));
    }

    #[test]
    fn update_validates_whole_snapshot() {
        let settings = Settings::default();
        let bad = StrategySettings { cumulative_flow_period: 4, ..StrategySettings::default() };
        assert!(settings.update(bad).is_err());

        let good = StrategySettings { symbol: TradeSymbol::Spy, ..StrategySettings::default() };
        settings.update(good.clone()).unwrap();
        assert_eq!(settings.snapshot(), good);
    }
}
