//! # strategy
//!
//! **Strategy** — the options-flow state machine that runs on every tick.
//!
//! ## Per-tick evaluation
//! ```text
//! 1. Warm-up          ignore the first WARM_UP_TICKS snapshots
//! 2. Market condition bullish / bearish from both symbols' cumulative flow
//! 3. Flow flags       call / put flow below FLOW_MINIMUM per symbol
//! 4. Intent open?     → exits (take-profit → trailing → flow → cumulative)
//!    No intent?       → entries (LONG then SHORT, gated by mode + re-entry)
//! ```
//!
//! A Strategy never places orders itself. Accepting an entry or closing an
//! intent emits a [`StrategyEvent`] to every registered listener; the
//! TradeManager turns those into Orders.

pub mod exits;
pub mod reentry;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::models::{Direction, ExitReason, MarketSnapshot, Signal};
use crate::settings::{StrategySettings, TradeSymbol};

use reentry::{can_reenter_direction, ExitMemory};

/// Snapshots ignored before the first decision, so the moving averages
/// behind the feed are seeded.
pub const WARM_UP_TICKS: u64 = 40;

/// Call / put flow below this value counts as "below minimum".
pub const FLOW_MINIMUM: f64 = 0.0;

// ─── Market condition ─────────────────────────────────────────────────────────

/// Everything the decision rules need from one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MarketCondition {
    pub is_bullish: bool,
    pub is_bearish: bool,
    pub primary_call_below_min: bool,
    pub primary_put_below_min: bool,
    pub confirmation_call_below_min: bool,
    pub confirmation_put_below_min: bool,
    /// `(primary, confirmation)` cumulative flow for the configured period.
    pub cumulative: (f64, f64),
}

impl MarketCondition {
    pub fn evaluate(snapshot: &MarketSnapshot, settings: &StrategySettings) -> Self {
        let cumulative = snapshot.cumulative(settings.cumulative_flow_period);
        let (primary, confirm) = cumulative;
        Self {
            is_bullish: primary > settings.bullish_threshold && confirm > settings.bullish_threshold,
            is_bearish: primary < settings.bearish_threshold && confirm < settings.bearish_threshold,
            primary_call_below_min: snapshot.primary.call_flow < FLOW_MINIMUM,
            primary_put_below_min: snapshot.primary.put_flow < FLOW_MINIMUM,
            confirmation_call_below_min: snapshot.confirmation.call_flow < FLOW_MINIMUM,
            confirmation_put_below_min: snapshot.confirmation.put_flow < FLOW_MINIMUM,
            cumulative,
        }
    }

    #[inline]
    pub fn call_flow_below_min(&self) -> bool {
        self.primary_call_below_min || self.confirmation_call_below_min
    }

    #[inline]
    pub fn put_flow_below_min(&self) -> bool {
        self.primary_put_below_min || self.confirmation_put_below_min
    }
}

// ─── Position intent ──────────────────────────────────────────────────────────

/// The Strategy's own record of an accepted entry, before and while a real
/// position exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionIntent {
    pub direction: Direction,
    pub price: f64,
    /// Running max since entry (trailing stop for LONG).
    pub max_price: f64,
    /// Running min since entry (trailing stop for SHORT).
    pub min_price: f64,
    pub opened_at: DateTime<Utc>,
}

impl PositionIntent {
    fn new(direction: Direction, price: f64) -> Self {
        Self { direction, price, max_price: price, min_price: price, opened_at: Utc::now() }
    }
}

// ─── Lifecycle events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyEvent {
    PositionOpened {
        strategy_id: String,
        settings: StrategySettings,
    },
    PositionClosed {
        strategy_id: String,
        exit_reason: ExitReason,
    },
}

// ─── Strategy ─────────────────────────────────────────────────────────────────

pub struct Strategy {
    id: String,
    settings: StrategySettings,
    ticks: u64,
    prices: VecDeque<f64>,
    intent: Option<PositionIntent>,
    exit_memory: ExitMemory,
    started: bool,
    accepting_entries: bool,
    listeners: Vec<mpsc::UnboundedSender<StrategyEvent>>,
}

impl Strategy {
    pub fn new(settings: StrategySettings) -> Self {
        Self {
            id: settings.strategy_id(),
            prices: VecDeque::with_capacity(settings.ma_period as usize + 1),
            settings,
            ticks: 0,
            intent: None,
            exit_memory: ExitMemory::default(),
            started: false,
            accepting_entries: true,
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn symbol(&self) -> TradeSymbol {
        self.settings.symbol
    }

    pub fn position_intent(&self) -> Option<&PositionIntent> {
        self.intent.as_ref()
    }

    pub fn exit_memory(&self) -> &ExitMemory {
        &self.exit_memory
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_accepting_entries(&self) -> bool {
        self.accepting_entries
    }

    /// Simple moving average of the trading symbol's price over `ma_period`,
    /// `None` until the window is full.
    pub fn moving_average(&self) -> Option<f64> {
        let period = self.settings.ma_period as usize;
        if period == 0 || self.prices.len() < period {
            return None;
        }
        Some(self.prices.iter().sum::<f64>() / period as f64)
    }

    /// Register a listener. Events are delivered synchronously to every
    /// listener in registration order.
    pub fn add_listener(&mut self, listener: mpsc::UnboundedSender<StrategyEvent>) {
        self.listeners.push(listener);
    }

    pub fn start(&mut self) {
        self.started = true;
        info!(strategy_id = %self.id, "▶️  Strategy started");
    }

    /// Keep evaluating exits for an open intent, but never enter again.
    pub fn demote(&mut self) {
        self.accepting_entries = false;
        debug!(strategy_id = %self.id, "Strategy demoted — exits only");
    }

    /// Stop processing ticks and drop every listener.
    pub fn dispose(&mut self) {
        self.started = false;
        self.accepting_entries = false;
        self.intent = None;
        self.listeners.clear();
        debug!(strategy_id = %self.id, "Strategy disposed");
    }

    // ── Tick processing ──────────────────────────────────────────────────────

    pub fn on_tick(&mut self, snapshot: &MarketSnapshot) -> Signal {
        if !self.started || snapshot.primary.symbol != self.settings.symbol {
            return Signal::Hold;
        }

        self.ticks += 1;
        let price = snapshot.price();
        if self.prices.len() >= self.settings.ma_period as usize {
            self.prices.pop_front();
        }
        self.prices.push_back(price);

        if self.ticks < WARM_UP_TICKS {
            return Signal::Hold;
        }

        let market = MarketCondition::evaluate(snapshot, &self.settings);

        match self.intent {
            Some(_) => self.evaluate_exit(price, &market),
            None => self.evaluate_entry(price, &market),
        }
    }

    fn evaluate_exit(&mut self, price: f64, market: &MarketCondition) -> Signal {
        let Some(intent) = self.intent.as_mut() else {
            return Signal::Hold;
        };
        let Some(reason) = exits::check_exit(intent, price, market, &self.settings) else {
            return Signal::Hold;
        };

        let direction = intent.direction;
        let entry = intent.price;
        self.intent = None;
        self.exit_memory.record(reason, direction, market.cumulative);

        info!(
            strategy_id = %self.id,
            direction   = %direction,
            ?reason,
            entry,
            price,
            "🔻 Position intent closed"
        );

        self.emit(StrategyEvent::PositionClosed {
            strategy_id: self.id.clone(),
            exit_reason: reason,
        });
        Signal::for_close(direction)
    }

    fn evaluate_entry(&mut self, price: f64, market: &MarketCondition) -> Signal {
        if !self.accepting_entries {
            return Signal::Hold;
        }

        let widening = self.settings.widening_threshold;
        let direction = if self.settings.mode.allows_long()
            && market.is_bullish
            && !market.call_flow_below_min()
            && can_reenter_direction(&mut self.exit_memory, Direction::Long, market, widening)
        {
            Some(Direction::Long)
        } else if self.settings.mode.allows_short()
            && market.is_bearish
            && !market.put_flow_below_min()
            && can_reenter_direction(&mut self.exit_memory, Direction::Short, market, widening)
        {
            Some(Direction::Short)
        } else {
            None
        };

        let Some(direction) = direction else {
            debug!(
                strategy_id = %self.id,
                bullish = market.is_bullish,
                bearish = market.is_bearish,
                "No entry this tick"
            );
            return Signal::Hold;
        };

        self.intent = Some(PositionIntent::new(direction, price));
        info!(
            strategy_id = %self.id,
            direction   = %direction,
            price,
            cumulative  = ?market.cumulative,
            "🎯 Position intent opened"
        );

        self.emit(StrategyEvent::PositionOpened {
            strategy_id: self.id.clone(),
            settings: self.settings.clone(),
        });
        Signal::for_open(direction)
    }

    fn emit(&mut self, event: StrategyEvent) {
        // Listeners whose receiver is gone are pruned.
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id)
            .field("ticks", &self.ticks)
            .field("intent", &self.intent)
            .field("exit_memory", &self.exit_memory)
            .field("accepting_entries", &self.accepting_entries)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::IndicatorTick;
    use std::collections::BTreeMap;

    pub(crate) fn tick(symbol: TradeSymbol, price: f64, cf8: f64, call: f64, put: f64) -> IndicatorTick {
        IndicatorTick {
            symbol,
            price,
            call_flow: call,
            put_flow: put,
            cumulative_flow: BTreeMap::from([(8, cf8)]),
            time: Utc::now(),
        }
    }

    pub(crate) fn snap(price: f64, qqq_cf: f64, spy_cf: f64) -> MarketSnapshot {
        MarketSnapshot {
            primary: tick(TradeSymbol::Qqq, price, qqq_cf, 10.0, 10.0),
            confirmation: tick(TradeSymbol::Spy, price, spy_cf, 10.0, 10.0),
        }
    }

    fn started(settings: StrategySettings) -> (Strategy, mpsc::UnboundedReceiver<StrategyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut s = Strategy::new(settings);
        s.add_listener(tx);
        s.start();
        (s, rx)
    }

    fn warm_up(s: &mut Strategy, price: f64) {
        while s.ticks_processed() < WARM_UP_TICKS - 1 {
            assert_eq!(s.on_tick(&snap(price, 0.0, 0.0)), Signal::Hold);
        }
    }

    #[test]
    fn warm_up_suppresses_signals() {
        let (mut s, mut rx) = started(StrategySettings::default());
        for _ in 1..WARM_UP_TICKS {
            assert_eq!(s.on_tick(&snap(100.0, 900.0, 900.0)), Signal::Hold);
        }
        assert!(rx.try_recv().is_err());
        assert!(s.position_intent().is_none());

        // The warm-up tick itself is the first one allowed to decide.
        assert_eq!(s.on_tick(&snap(100.0, 900.0, 900.0)), Signal::Buy);
    }

    #[test]
    fn bullish_flow_opens_long() {
        let settings = StrategySettings {
            bullish_threshold: 500.0,
            cumulative_flow_period: 8,
            ..StrategySettings::default()
        };
        let (mut s, mut rx) = started(settings.clone());
        warm_up(&mut s, 100.0);

        assert_eq!(s.on_tick(&snap(100.0, 600.0, 600.0)), Signal::Buy);
        assert_eq!(s.position_intent().unwrap().direction, Direction::Long);
        assert_eq!(
            rx.try_recv().unwrap(),
            StrategyEvent::PositionOpened { strategy_id: settings.strategy_id(), settings }
        );
    }

    #[test]
    fn one_symbol_alone_is_not_bullish() {
        let (mut s, _rx) = started(StrategySettings::default());
        warm_up(&mut s, 100.0);
        assert_eq!(s.on_tick(&snap(100.0, 600.0, 400.0)), Signal::Hold);
    }

    #[test]
    fn negative_call_flow_blocks_long_entry() {
        let (mut s, _rx) = started(StrategySettings::default());
        warm_up(&mut s, 100.0);
        let mut snapshot = snap(100.0, 600.0, 600.0);
        snapshot.confirmation.call_flow = -1.0;
        assert_eq!(s.on_tick(&snapshot), Signal::Hold);
    }

    #[test]
    fn mode_restricts_directions() {
        let settings = StrategySettings { mode: crate::settings::StrategyMode::Long, ..StrategySettings::default() };
        let (mut s, _rx) = started(settings);
        warm_up(&mut s, 100.0);
        assert_eq!(s.on_tick(&snap(100.0, -600.0, -600.0)), Signal::Hold);

        let settings = StrategySettings { mode: crate::settings::StrategyMode::Short, ..StrategySettings::default() };
        let (mut s, _rx) = started(settings);
        warm_up(&mut s, 100.0);
        assert_eq!(s.on_tick(&snap(100.0, 600.0, 600.0)), Signal::Hold);
        assert_eq!(s.on_tick(&snap(100.0, -600.0, -600.0)), Signal::Sell);
    }

    #[test]
    fn take_profit_closes_intent() {
        let settings = StrategySettings { take_profit_amount: 70.0, ..StrategySettings::default() };
        let (mut s, mut rx) = started(settings);
        warm_up(&mut s, 100.0);
        s.on_tick(&snap(100.0, 600.0, 600.0));
        let _opened = rx.try_recv().unwrap();

        assert_eq!(s.on_tick(&snap(100.70, 600.0, 600.0)), Signal::Sell);
        assert!(s.position_intent().is_none());
        match rx.try_recv().unwrap() {
            StrategyEvent::PositionClosed { exit_reason, .. } => {
                assert_eq!(exit_reason, ExitReason::TakeProfit)
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(s.exit_memory().reason, ExitReason::TakeProfit);
        assert_eq!(s.exit_memory().cumulative, Some((600.0, 600.0)));
    }

    #[test]
    fn take_profit_exit_gates_reentry_until_flow_widens() {
        let settings = StrategySettings {
            take_profit_amount: 70.0,
            widening_threshold: 250.0,
            ..StrategySettings::default()
        };
        let (mut s, _rx) = started(settings);
        warm_up(&mut s, 100.0);
        s.on_tick(&snap(100.0, 500.1, 500.1));
        s.on_tick(&snap(101.0, 500.1, 500.1));
        assert!(s.position_intent().is_none());

        assert_eq!(s.on_tick(&snap(101.0, 600.0, 600.0)), Signal::Hold);
        assert_eq!(s.on_tick(&snap(101.0, 800.0, 800.0)), Signal::Buy);
    }

    #[test]
    fn cumulative_reversal_then_reentry_on_bullish() {
        let (mut s, _rx) = started(StrategySettings::default());
        warm_up(&mut s, 100.0);
        s.on_tick(&snap(100.0, 600.0, 600.0));

        assert_eq!(s.on_tick(&snap(100.1, -600.0, -600.0)), Signal::Sell);
        assert_eq!(s.exit_memory().reason, ExitReason::CumulativeFlow);
        // Same tick cannot flip into SHORT: the intent was open when it arrived.
        assert!(s.position_intent().is_none());

        assert_eq!(s.on_tick(&snap(100.1, 100.0, 100.0)), Signal::Hold);
        assert_eq!(s.on_tick(&snap(100.1, 600.0, 600.0)), Signal::Buy);
        assert_eq!(s.exit_memory().reason, ExitReason::None);
    }

    #[test]
    fn demoted_strategy_only_exits() {
        let (mut s, _rx) = started(StrategySettings::default());
        warm_up(&mut s, 100.0);
        s.on_tick(&snap(100.0, 600.0, 600.0));
        s.demote();

        assert_eq!(s.on_tick(&snap(101.0, 600.0, 600.0)), Signal::Sell);
        assert_eq!(s.on_tick(&snap(101.0, 900.0, 900.0)), Signal::Hold);
    }

    #[test]
    fn ignores_other_symbols_and_unstarted() {
        let mut s = Strategy::new(StrategySettings::default());
        assert_eq!(s.on_tick(&snap(100.0, 600.0, 600.0)), Signal::Hold);
        assert_eq!(s.ticks_processed(), 0);

        s.start();
        let mut spy_first = snap(100.0, 600.0, 600.0);
        std::mem::swap(&mut spy_first.primary, &mut spy_first.confirmation);
        s.on_tick(&spy_first);
        assert_eq!(s.ticks_processed(), 0);
    }

    #[test]
    fn moving_average_fills_after_period() {
        let settings = StrategySettings { ma_period: 5, ..StrategySettings::default() };
        let (mut s, _rx) = started(settings);
        for p in [1.0, 2.0, 3.0, 4.0] {
            s.on_tick(&snap(p, 0.0, 0.0));
        }
        assert_eq!(s.moving_average(), None);
        s.on_tick(&snap(5.0, 0.0, 0.0));
        assert_eq!(s.moving_average(), Some(3.0));
        s.on_tick(&snap(6.0, 0.0, 0.0));
        assert_eq!(s.moving_average(), Some(4.0));
    }

    #[test]
    fn listeners_receive_in_registration_order() {
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let mut s = Strategy::new(StrategySettings::default());
        s.add_listener(tx_a);
        s.add_listener(tx_b);
        s.start();
        warm_up(&mut s, 100.0);
        s.on_tick(&snap(100.0, 600.0, 600.0));

        assert!(matches!(rx_a.try_recv(), Ok(StrategyEvent::PositionOpened { .. })));
        assert!(matches!(rx_b.try_recv(), Ok(StrategyEvent::PositionOpened { .. })));
    }
}
