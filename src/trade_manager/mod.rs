//! # trade_manager
//!
//! **TradeManager** — the single task that owns every trading decision.
//!
//! ## Inputs (one `tokio::select!` loop)
//! ```text
//! indicator ticks   ─► FeedAggregator ─► every Strategy ─► StrategyEvent ─► open / close Orders
//! settings changes  ─► new active Strategy, previous one demoted
//! commands          ─► reset / cancel order / cleanup
//! order events      ─► fill & cancel reconciliation (TradeBook transactions)
//! finished tasks    ─► execution bookkeeping
//! ```
//!
//! Strategies are kept in creation order; the last one is the active one and
//! the only one accepting entries. Order executions run as spawned tasks in a
//! `JoinSet` and only report back through [`OrderEvent`]s, so all state
//! changes happen on this task.

pub mod book;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::automation::MarketUiDriver;
use crate::events::{publish, MonitorEvent};
use crate::feed::FeedAggregator;
use crate::models::{ExitReason, IndicatorTick, MarketSnapshot, Position, Signal};
use crate::order::execution::{ExecutionConfig, ExecutionReport};
use crate::order::{Completion, Order, OrderEvent};
use crate::settings::{settings_changed, Settings, StrategySettings};
use crate::strategy::reentry::ExitMemory;
use crate::strategy::{PositionIntent, Strategy, StrategyEvent};

pub use book::{BookError, BookHandle, TradeBook};

/// Indicator ticks buffered between the HTTP feed and the manager task.
const TICK_QUEUE: usize = 1024;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("unknown strategy {0}")]
    UnknownStrategy(String),

    #[error("order {0} is not active")]
    OrderNotActive(Uuid),

    #[error(transparent)]
    Book(#[from] BookError),

    #[error("trade manager is not running")]
    Stopped,
}

// ─── Config / views ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Contracts per opening order.
    pub quantity: u32,
    pub strike_increment: f64,
    pub execution: Arc<ExecutionConfig>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            quantity: 1,
            strike_increment: 1.0,
            execution: Arc::new(ExecutionConfig::default()),
        }
    }
}

/// Read-only view of one Strategy for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub id: String,
    pub settings: StrategySettings,
    pub is_active: bool,
    pub accepting_entries: bool,
    pub ticks_processed: u64,
    pub moving_average: Option<f64>,
    pub position_intent: Option<PositionIntent>,
    pub exit_memory: ExitMemory,
}

impl StrategySummary {
    fn of(strategy: &Strategy, is_active: bool) -> Self {
        Self {
            id: strategy.id().to_string(),
            settings: strategy.settings().clone(),
            is_active,
            accepting_entries: strategy.is_accepting_entries(),
            ticks_processed: strategy.ticks_processed(),
            moving_average: strategy.moving_average(),
            position_intent: strategy.position_intent().copied(),
            exit_memory: *strategy.exit_memory(),
        }
    }
}

#[derive(Debug)]
pub enum ManagerCommand {
    /// Reply carries the id of the fresh active strategy.
    Reset { reply: oneshot::Sender<String> },
    CancelOrder {
        order_id: Uuid,
        reply: oneshot::Sender<Result<Order, TradeError>>,
    },
    /// Reply carries the ids of the disposed strategies.
    Cleanup { reply: oneshot::Sender<Vec<String>> },
}

// ─── TradeManager ─────────────────────────────────────────────────────────────

pub struct TradeManager {
    settings: Settings,
    settings_rx: watch::Receiver<StrategySettings>,
    last_settings: Option<StrategySettings>,

    strategies: Vec<Strategy>,
    strategy_tx: mpsc::UnboundedSender<StrategyEvent>,
    strategy_rx: mpsc::UnboundedReceiver<StrategyEvent>,

    book: BookHandle,
    feed: FeedAggregator,
    last_prices: BTreeMap<String, f64>,

    driver: Arc<dyn MarketUiDriver>,
    config: ManagerConfig,
    order_tx: mpsc::UnboundedSender<OrderEvent>,
    order_rx: mpsc::UnboundedReceiver<OrderEvent>,
    executions: JoinSet<(Uuid, ExecutionReport)>,
    in_flight: HashMap<Uuid, AbortHandle>,

    summaries: watch::Sender<Vec<StrategySummary>>,
    monitor: broadcast::Sender<String>,
}

impl TradeManager {
    pub fn new(
        settings: Settings,
        driver: Arc<dyn MarketUiDriver>,
        config: ManagerConfig,
        monitor: broadcast::Sender<String>,
    ) -> Self {
        let (strategy_tx, strategy_rx) = mpsc::unbounded_channel();
        let (order_tx, order_rx) = mpsc::unbounded_channel();
        let (summaries, _) = watch::channel(Vec::new());

        let mut manager = Self {
            settings_rx: settings.subscribe(),
            settings,
            last_settings: None,
            strategies: Vec::new(),
            strategy_tx,
            strategy_rx,
            book: BookHandle::new(),
            feed: FeedAggregator::new(),
            last_prices: BTreeMap::new(),
            driver,
            config,
            order_tx,
            order_rx,
            executions: JoinSet::new(),
            in_flight: HashMap::new(),
            summaries,
            monitor,
        };

        let initial = manager.settings.snapshot();
        manager.on_settings(initial.clone());
        manager.activate_strategy(initial);
        manager
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn book(&self) -> TradeBook {
        self.book.read(TradeBook::clone)
    }

    pub fn active_strategy(&self) -> Option<&Strategy> {
        self.strategies.last()
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    // ── Strategy lifecycle ───────────────────────────────────────────────────

    /// Evaluate a settings snapshot. The first evaluation only records it;
    /// afterwards a changed snapshot replaces the active strategy.
    pub fn on_settings(&mut self, next: StrategySettings) {
        let Some(previous) = self.last_settings.replace(next.clone()) else {
            debug!(strategy_id = %next.strategy_id(), "Initial settings recorded");
            return;
        };
        if !settings_changed(&previous, &next) {
            return;
        }

        info!(
            from = %previous.strategy_id(),
            to   = %next.strategy_id(),
            "⚙️  Settings changed — rotating strategy"
        );
        self.activate_strategy(next);
    }

    fn activate_strategy(&mut self, settings: StrategySettings) -> String {
        if let Some(previous) = self.strategies.last_mut() {
            previous.demote();
        }

        let mut strategy = Strategy::new(settings.clone());
        strategy.add_listener(self.strategy_tx.clone());
        strategy.start();
        let id = strategy.id().to_string();
        self.strategies.push(strategy);

        publish(
            &self.monitor,
            &MonitorEvent::StrategyActivated { strategy_id: id.clone(), settings: Box::new(settings) },
        );
        self.publish_strategies();
        id
    }

    /// Dispose demoted strategies that no longer own an open intent, an
    /// active order or an active position. Not part of the default loop;
    /// triggered by [`ManagerCommand::Cleanup`].
    pub fn cleanup_strategies(&mut self) -> Vec<String> {
        let Some(active) = self.strategies.len().checked_sub(1) else {
            return Vec::new();
        };
        let book = self.book.read(TradeBook::clone);

        let mut removed = Vec::new();
        let mut index = 0;
        self.strategies.retain_mut(|strategy| {
            let keep = index == active
                || strategy.position_intent().is_some()
                || book.has_activity_for(strategy.id());
            index += 1;
            if !keep {
                strategy.dispose();
                removed.push(strategy.id().to_string());
            }
            keep
        });

        if !removed.is_empty() {
            info!(count = removed.len(), "🧹 Idle strategies disposed");
            self.publish_strategies();
        }
        removed
    }

    fn publish_strategies(&self) {
        let active = self.strategies.len().saturating_sub(1);
        let summaries = self
            .strategies
            .iter()
            .enumerate()
            .map(|(i, s)| StrategySummary::of(s, i == active))
            .collect();
        self.summaries.send_replace(summaries);
    }

    // ── Market data ──────────────────────────────────────────────────────────

    pub fn on_indicator_tick(&mut self, tick: IndicatorTick) {
        if let Some(snapshot) = self.feed.push(tick) {
            self.on_snapshot(&snapshot);
        }
    }

    /// Run every strategy on `snapshot`, handling the events each one emits
    /// before the next strategy sees the tick.
    pub fn on_snapshot(&mut self, snapshot: &MarketSnapshot) {
        self.last_prices
            .insert(snapshot.primary.symbol.as_str().to_string(), snapshot.price());

        for index in 0..self.strategies.len() {
            let signal = self.strategies[index].on_tick(snapshot);
            if signal != Signal::Hold {
                publish(
                    &self.monitor,
                    &MonitorEvent::SignalEmitted {
                        strategy_id: self.strategies[index].id().to_string(),
                        signal,
                        price: snapshot.price(),
                    },
                );
            }
            self.drain_strategy_events(index);
        }
        self.publish_strategies();
    }

    fn drain_strategy_events(&mut self, origin: usize) {
        while let Ok(event) = self.strategy_rx.try_recv() {
            let result = match event {
                StrategyEvent::PositionOpened { strategy_id, settings } => {
                    self.open_order(origin, &strategy_id, &settings)
                }
                StrategyEvent::PositionClosed { strategy_id, exit_reason } => {
                    self.close_positions(&strategy_id, exit_reason)
                }
            };
            if let Err(e) = result {
                error!(error = %e, "❌ Strategy event handling failed");
            }
        }
    }

    // ── Orders ───────────────────────────────────────────────────────────────

    fn open_order(
        &mut self,
        origin: usize,
        strategy_id: &str,
        settings: &StrategySettings,
    ) -> Result<(), TradeError> {
        let symbol = settings.symbol.as_str();
        if self.book.read(|b| b.has_active_order_for(symbol)) {
            warn!(strategy_id, symbol, "⏸️  Active order already exists for symbol — open skipped");
            return Ok(());
        }

        let strategy = self
            .strategies
            .get(origin)
            .filter(|s| s.id() == strategy_id)
            .ok_or_else(|| TradeError::UnknownStrategy(strategy_id.to_string()))?;
        let Some(intent) = strategy.position_intent().copied() else {
            warn!(strategy_id, "No position intent — open skipped");
            return Ok(());
        };

        let order = Order::opening(
            strategy_id,
            settings,
            intent.direction,
            intent.price,
            self.config.quantity,
            self.config.strike_increment,
        );
        self.submit(order)
    }

    fn close_positions(&mut self, strategy_id: &str, exit_reason: ExitReason) -> Result<(), TradeError> {
        let positions: Vec<Position> =
            self.book.read(|b| b.active_positions_of(strategy_id).cloned().collect());
        if positions.is_empty() {
            debug!(strategy_id, ?exit_reason, "No active positions to close");
            return Ok(());
        }

        let settings = self
            .strategies
            .iter()
            .rev()
            .find(|s| s.id() == strategy_id)
            .map(|s| s.settings().clone())
            .unwrap_or_else(|| self.settings.snapshot());

        for position in positions {
            let price = self
                .last_prices
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.entry_price);
            let order = Order::closing(&position, &settings, exit_reason, price);
            self.submit(order)?;
        }
        Ok(())
    }

    /// Register `order` as active and start its execution.
    fn submit(&mut self, order: Order) -> Result<(), TradeError> {
        self.book.transaction(|b| b.add_active_order(order.clone()))?;

        info!(
            order_id   = %order.id,
            symbol     = %order.symbol,
            instrument = %order.instrument_id,
            direction  = %order.direction,
            closing    = order.is_closing,
            "📤 Order placed"
        );
        publish(&self.monitor, &MonitorEvent::OrderPlaced { order: Box::new(order.clone()) });

        let order_id = order.id;
        let completion = Completion::new(order_id, self.order_tx.clone());
        let driver = Arc::clone(&self.driver);
        let config = Arc::clone(&self.config.execution);
        let handle = self.executions.spawn(async move {
            let report = order.execute(driver, config, completion).await;
            (order_id, report)
        });
        self.in_flight.insert(order_id, handle);
        Ok(())
    }

    /// Drop a stuck active order. Its execution, if still running, is
    /// aborted and any late outcome is ignored.
    pub fn cancel_order(&mut self, order_id: Uuid) -> Result<Order, TradeError> {
        let order = self
            .book
            .transaction(|b| b.discard_order(order_id))
            .map_err(|_| TradeError::OrderNotActive(order_id))?;
        if let Some(handle) = self.in_flight.remove(&order_id) {
            handle.abort();
        }

        warn!(order_id = %order_id, symbol = %order.symbol, "🛑 Order cancelled manually");
        publish(
            &self.monitor,
            &MonitorEvent::OrderCancelled { order_id, reason: "cancelled by operator".into() },
        );
        Ok(order)
    }

    // ── Reconciliation ───────────────────────────────────────────────────────

    pub fn on_order_event(&mut self, event: OrderEvent) {
        let result = match event {
            OrderEvent::Filled { order, position: Some(position) } => self.reconcile_opening(order, position),
            OrderEvent::Filled { order, position: None } => self.reconcile_closing(order),
            OrderEvent::Cancelled { order_id, reason } => self.reconcile_cancel(order_id, reason),
        };
        if let Err(e) = result {
            warn!(error = %e, "⚠️ Order event ignored");
        }
    }

    fn reconcile_opening(&mut self, order: Order, position: Position) -> Result<(), TradeError> {
        self.book.transaction(|b| {
            b.complete_order(order.clone())?;
            b.add_active_position(position.clone())
        })?;

        info!(
            order_id    = %order.id,
            position_id = %position.id,
            instrument  = %position.instrument_id,
            entry       = position.entry_price,
            "📈 Position opened"
        );
        publish(&self.monitor, &MonitorEvent::OrderFilled { order: Box::new(order) });
        publish(&self.monitor, &MonitorEvent::PositionOpened { position: Box::new(position) });
        Ok(())
    }

    fn reconcile_closing(&mut self, order: Order) -> Result<(), TradeError> {
        let reason = order.exit_reason.unwrap_or(ExitReason::Manual);
        let price = order.execution_price.unwrap_or(order.reference_price);

        let closed = self.book.transaction(|b| {
            b.complete_order(order.clone())?;
            let Some(position_id) = b.active_position_by_instrument(&order.instrument_id).map(|p| p.id) else {
                return Ok::<_, BookError>(None);
            };
            b.close_position(position_id, reason, price).map(Some)
        })?;

        match closed {
            Some(position) => {
                let pnl = position.pnl();
                info!(
                    order_id    = %order.id,
                    position_id = %position.id,
                    ?reason,
                    price,
                    pnl         = ?pnl,
                    "📉 Position closed"
                );
                publish(&self.monitor, &MonitorEvent::PositionClosed { position: Box::new(position), pnl });
            }
            None => warn!(
                order_id   = %order.id,
                instrument = %order.instrument_id,
                "Closing fill without a matching active position"
            ),
        }
        publish(&self.monitor, &MonitorEvent::OrderFilled { order: Box::new(order) });
        Ok(())
    }

    fn reconcile_cancel(&mut self, order_id: Uuid, reason: String) -> Result<(), TradeError> {
        self.book.transaction(|b| b.discard_order(order_id))?;
        publish(&self.monitor, &MonitorEvent::OrderCancelled { order_id, reason });
        Ok(())
    }

    fn on_execution_finished(&mut self, joined: Result<(Uuid, ExecutionReport), JoinError>) {
        match joined {
            Ok((order_id, report)) => {
                self.in_flight.remove(&order_id);
                debug!(order_id = %order_id, success = report.success, "Execution finished");
            }
            Err(e) if e.is_cancelled() => debug!("Execution aborted"),
            Err(e) => error!(error = %e, "💥 Order execution task panicked"),
        }
        self.in_flight.retain(|_, handle| !handle.is_finished());
    }

    // ── Session ──────────────────────────────────────────────────────────────

    /// Abort and await every in-flight execution, forget the book and the
    /// last feed ticks, then replace every strategy with a fresh one built
    /// from the current settings.
    pub async fn reset(&mut self) -> String {
        info!(in_flight = self.executions.len(), "🔄 Resetting trading session");

        self.executions.shutdown().await;
        self.in_flight.clear();
        while self.order_rx.try_recv().is_ok() {}
        while self.strategy_rx.try_recv().is_ok() {}

        self.book.clear();
        self.feed.clear();
        self.last_prices.clear();
        for strategy in &mut self.strategies {
            strategy.dispose();
        }
        self.strategies.clear();

        let settings = self.settings.snapshot();
        self.last_settings = Some(settings.clone());
        let strategy_id = self.activate_strategy(settings);

        publish(&self.monitor, &MonitorEvent::SessionReset { strategy_id: strategy_id.clone() });
        strategy_id
    }

    async fn on_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Reset { reply } => {
                let strategy_id = self.reset().await;
                let _ = reply.send(strategy_id);
            }
            ManagerCommand::CancelOrder { order_id, reply } => {
                let _ = reply.send(self.cancel_order(order_id));
            }
            ManagerCommand::Cleanup { reply } => {
                let _ = reply.send(self.cleanup_strategies());
            }
        }
    }

    // ── Task ─────────────────────────────────────────────────────────────────

    /// Move the manager onto its own task.
    pub fn spawn(self) -> (ManagerHandle, JoinHandle<()>) {
        let (tick_tx, tick_rx) = mpsc::channel(TICK_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(16);
        let handle = ManagerHandle {
            ticks: tick_tx,
            commands: command_tx,
            book: self.book.subscribe(),
            strategies: self.summaries.subscribe(),
        };
        let task = tokio::spawn(self.run(tick_rx, command_rx));
        (handle, task)
    }

    /// Process inputs until every [`ManagerHandle`] is dropped.
    pub async fn run(
        mut self,
        mut ticks: mpsc::Receiver<IndicatorTick>,
        mut commands: mpsc::Receiver<ManagerCommand>,
    ) {
        info!(strategy_id = ?self.active_strategy().map(Strategy::id), "🧠 Trade manager running");
        let mut ticks_open = true;
        let mut commands_open = true;

        while ticks_open || commands_open {
            tokio::select! {
                tick = ticks.recv(), if ticks_open => match tick {
                    Some(tick) => self.on_indicator_tick(tick),
                    None => ticks_open = false,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command).await,
                    None => commands_open = false,
                },
                Ok(()) = self.settings_rx.changed() => {
                    let next = self.settings_rx.borrow_and_update().clone();
                    self.on_settings(next);
                }
                Some(event) = self.order_rx.recv() => self.on_order_event(event),
                Some(joined) = self.executions.join_next(), if !self.executions.is_empty() => {
                    self.on_execution_finished(joined);
                }
            }
        }

        self.executions.shutdown().await;
        info!("Trade manager stopped");
    }
}

// ─── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable front door to a running [`TradeManager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    ticks: mpsc::Sender<IndicatorTick>,
    commands: mpsc::Sender<ManagerCommand>,
    book: watch::Receiver<TradeBook>,
    strategies: watch::Receiver<Vec<StrategySummary>>,
}

impl ManagerHandle {
    pub async fn push_tick(&self, tick: IndicatorTick) -> Result<(), TradeError> {
        self.ticks.send(tick).await.map_err(|_| TradeError::Stopped)
    }

    pub async fn reset(&self) -> Result<String, TradeError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManagerCommand::Reset { reply }).await?;
        rx.await.map_err(|_| TradeError::Stopped)
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, TradeError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManagerCommand::CancelOrder { order_id, reply }).await?;
        rx.await.map_err(|_| TradeError::Stopped)?
    }

    pub async fn cleanup(&self) -> Result<Vec<String>, TradeError> {
        let (reply, rx) = oneshot::channel();
        self.send(ManagerCommand::Cleanup { reply }).await?;
        rx.await.map_err(|_| TradeError::Stopped)
    }

    async fn send(&self, command: ManagerCommand) -> Result<(), TradeError> {
        self.commands.send(command).await.map_err(|_| TradeError::Stopped)
    }

    pub fn book(&self) -> TradeBook {
        self.book.borrow().clone()
    }

    pub fn subscribe_book(&self) -> watch::Receiver<TradeBook> {
        self.book.clone()
    }

    pub fn strategies(&self) -> Vec<StrategySummary> {
        self.strategies.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{ScriptedDriver, WaitPolicy};
    use crate::models::Direction;
    use crate::settings::{StrategyMode, TradeSymbol};
    use crate::strategy::tests::{snap, tick};
    use crate::strategy::WARM_UP_TICKS;
    use std::time::Duration;

    fn manager(page: Arc<ScriptedDriver>) -> (TradeManager, Settings) {
        let settings = Settings::default();
        let config = ManagerConfig {
            quantity: 1,
            strike_increment: 1.0,
            execution: Arc::new(ExecutionConfig {
                wait: WaitPolicy::new(Duration::from_secs(1), Duration::from_millis(100)),
                settle_delay: Duration::from_millis(10),
                ..ExecutionConfig::default()
            }),
        };
        let (monitor, _) = broadcast::channel(64);
        (TradeManager::new(settings.clone(), page, config, monitor), settings)
    }

    fn warm_up(m: &mut TradeManager, price: f64) {
        while m.active_strategy().unwrap().ticks_processed() < WARM_UP_TICKS - 1 {
            m.on_snapshot(&snap(price, 0.0, 0.0));
        }
    }

    /// Join every execution and apply the outcomes they reported.
    async fn settle(m: &mut TradeManager) {
        while let Some(joined) = m.executions.join_next().await {
            m.on_execution_finished(joined);
        }
        while let Ok(event) = m.order_rx.try_recv() {
            m.on_order_event(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bullish_flow_places_one_long_call_order() {
        let (mut m, _settings) = manager(Arc::new(ScriptedDriver::new()));
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));

        let book = m.book();
        assert_eq!(book.active_orders.len(), 1);
        let order = book.active_orders.values().next().unwrap();
        assert_eq!(order.direction, Direction::Long);
        assert_eq!(order.instrument_id, "QQQ-C-450");
        assert!(!order.is_closing);
    }

    #[tokio::test(start_paused = true)]
    async fn one_active_order_per_symbol() {
        let (mut m, settings) = manager(Arc::new(ScriptedDriver::new()));
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        assert_eq!(m.book().active_orders.len(), 1);

        settings.set_take_profit_amount(90.0);
        m.on_settings(settings.snapshot());
        assert_eq!(m.strategies().len(), 2);
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));

        // The new strategy accepted its entry, but the order was not duplicated.
        assert!(m.active_strategy().unwrap().position_intent().is_some());
        assert_eq!(m.book().active_orders.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fills_move_orders_and_positions_to_closed() {
        let (mut m, _settings) = manager(Arc::new(ScriptedDriver::new()));
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        settle(&mut m).await;

        let book = m.book();
        assert!(book.active_orders.is_empty());
        assert_eq!(book.closed_orders.len(), 1);
        let position = book.active_positions.values().next().unwrap().clone();
        assert_eq!(position.instrument_id, "QQQ-C-450");
        assert_eq!(position.entry_price, 450.0);

        // Take-profit is 70 cents above the intent price.
        m.on_snapshot(&snap(451.0, 600.0, 600.0));
        let closing = m.book().active_orders.values().next().unwrap().clone();
        assert!(closing.is_closing);
        assert_eq!(closing.instrument_id, position.instrument_id);
        settle(&mut m).await;

        let book = m.book();
        assert!(book.active_orders.is_empty());
        assert!(book.active_positions.is_empty());
        assert_eq!(book.closed_orders.len(), 2);
        let closed = &book.closed_positions[&position.id];
        assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(closed.close_price, Some(451.0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_order_is_removed_without_closing() {
        let page = Arc::new(ScriptedDriver::new());
        page.hide(&ExecutionConfig::default().selectors.options_chain);
        let (mut m, _settings) = manager(page);
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        settle(&mut m).await;

        let book = m.book();
        assert!(book.active_orders.is_empty());
        assert!(book.closed_orders.is_empty());
        assert!(book.active_positions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_events_never_revive_closed_orders() {
        let (mut m, _settings) = manager(Arc::new(ScriptedDriver::new()));
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        settle(&mut m).await;
        let order = m.book().closed_orders.values().next().unwrap().clone();

        m.on_order_event(OrderEvent::Cancelled { order_id: order.id, reason: "late".into() });
        let position = Position::open("QQQ", "QQQ-C-450", Direction::Long, 1.0, 1, order.strategy_id.clone());
        m.on_order_event(OrderEvent::Filled { order: order.clone(), position: Some(position) });

        let book = m.book();
        assert!(book.active_orders.is_empty());
        assert!(book.closed_orders.contains_key(&order.id));
        assert_eq!(book.active_positions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_changes_rotate_strategies() {
        let (mut m, settings) = manager(Arc::new(ScriptedDriver::new()));
        assert_eq!(m.strategies().len(), 1);

        m.on_settings(settings.snapshot());
        assert_eq!(m.strategies().len(), 1, "unchanged settings keep the strategy");

        settings.set_mode(StrategyMode::Long);
        m.on_settings(settings.snapshot());
        assert_eq!(m.strategies().len(), 2);
        assert!(!m.strategies()[0].is_accepting_entries());
        assert!(m.strategies()[0].is_started());
        let active = m.active_strategy().unwrap();
        assert!(active.is_accepting_entries());
        assert_eq!(active.settings().mode, StrategyMode::Long);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_awaits_executions_and_starts_fresh() {
        let page = Arc::new(ScriptedDriver::new());
        page.hide(&ExecutionConfig::default().selectors.options_chain);
        let (mut m, _settings) = manager(page);
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        assert_eq!(m.executions.len(), 1);

        let strategy_id = m.reset().await;
        assert!(m.executions.is_empty());
        assert_eq!(m.book(), TradeBook::default());
        assert_eq!(m.strategies().len(), 1);
        assert_eq!(m.active_strategy().unwrap().id(), strategy_id);
        assert_eq!(m.active_strategy().unwrap().ticks_processed(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(m.order_rx.try_recv().is_err(), "aborted executions never report");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_forgets_feed_and_reference_prices() {
        let (mut m, _settings) = manager(Arc::new(ScriptedDriver::new()));
        m.on_indicator_tick(tick(TradeSymbol::Spy, 520.0, 0.0, 10.0, 10.0));
        m.on_indicator_tick(tick(TradeSymbol::Qqq, 450.0, 0.0, 10.0, 10.0));
        assert_eq!(m.last_prices.get("QQQ"), Some(&450.0));

        m.reset().await;
        assert!(m.last_prices.is_empty());
        assert!(m.feed.latest(TradeSymbol::Spy).is_none());

        // A lone QQQ tick no longer pairs with the pre-reset SPY tick.
        m.on_indicator_tick(tick(TradeSymbol::Qqq, 451.0, 0.0, 10.0, 10.0));
        assert_eq!(m.active_strategy().unwrap().ticks_processed(), 0);
        assert!(m.last_prices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_order_can_be_cancelled_by_hand() {
        let page = Arc::new(ScriptedDriver::new());
        page.fail_clicks_on(&ExecutionConfig::default().selectors.confirm_button);
        let (mut m, _settings) = manager(page);
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        settle(&mut m).await;

        let stuck = m.book().active_orders.values().next().unwrap().clone();
        let cancelled = m.cancel_order(stuck.id).unwrap();
        assert_eq!(cancelled.id, stuck.id);
        assert!(m.book().active_orders.is_empty());
        assert!(matches!(m.cancel_order(stuck.id), Err(TradeError::OrderNotActive(id)) if id == stuck.id));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_disposes_only_idle_demoted_strategies() {
        let (mut m, settings) = manager(Arc::new(ScriptedDriver::new()));
        warm_up(&mut m, 450.0);
        m.on_snapshot(&snap(450.0, 600.0, 600.0));
        settle(&mut m).await;
        let busy = m.active_strategy().unwrap().id().to_string();

        settings.set_mode(StrategyMode::Short);
        m.on_settings(settings.snapshot());
        settings.set_mode(StrategyMode::Long);
        m.on_settings(settings.snapshot());
        assert_eq!(m.strategies().len(), 3);

        let removed = m.cleanup_strategies();
        assert_eq!(removed.len(), 1);
        let ids: Vec<&str> = m.strategies().iter().map(Strategy::id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], busy);
    }

    #[tokio::test(start_paused = true)]
    async fn running_manager_reconciles_and_resets() {
        let (m, _settings) = manager(Arc::new(ScriptedDriver::new()));
        let (handle, _task) = m.spawn();
        let mut book = handle.subscribe_book();

        handle.push_tick(tick(TradeSymbol::Spy, 520.0, 600.0, 5.0, 5.0)).await.unwrap();
        for _ in 0..WARM_UP_TICKS {
            handle.push_tick(tick(TradeSymbol::Qqq, 450.0, 600.0, 5.0, 5.0)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(30), book.wait_for(|b| b.active_positions.len() == 1))
            .await
            .expect("position opened in time")
            .unwrap();
        assert_eq!(handle.strategies().len(), 1);
        assert!(handle.strategies()[0].position_intent.is_some());

        handle.reset().await.unwrap();
        assert_eq!(handle.book(), TradeBook::default());
        assert_eq!(handle.strategies()[0].ticks_processed, 0);
        assert!(handle.cleanup().await.unwrap().is_empty());
    }
}
