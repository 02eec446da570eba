//! # trade_manager::book
//!
//! [`TradeBook`] holds the four maps of a trading session (active / closed
//! orders, active / closed positions). It is published through a
//! `tokio::sync::watch` channel by [`BookHandle`].
//!
//! ## Transactions
//! A mutation runs against a clone of the current book. Only when the closure
//! returns `Ok` is the clone published, with a single `send_replace`, so a
//! subscriber never observes a half-applied move (order closed but position
//! still active, or the reverse).
//!
//! ## Monotonicity
//! An id that reached a closed map never re-enters an active one. The move
//! helpers below enforce it and report violations as [`BookError`].

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{ExitReason, Position};
use crate::order::Order;

#[derive(Debug, Error, PartialEq)]
pub enum BookError {
    #[error("order {0} is not active")]
    OrderNotActive(Uuid),

    #[error("position {0} is not active")]
    PositionNotActive(Uuid),

    #[error("{0} was already closed and cannot become active again")]
    AlreadyClosed(Uuid),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeBook {
    pub active_orders: BTreeMap<Uuid, Order>,
    pub closed_orders: BTreeMap<Uuid, Order>,
    pub active_positions: BTreeMap<Uuid, Position>,
    pub closed_positions: BTreeMap<Uuid, Position>,
}

impl TradeBook {
    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn has_active_order_for(&self, symbol: &str) -> bool {
        self.active_orders.values().any(|o| o.symbol == symbol)
    }

    pub fn active_position_by_instrument(&self, instrument_id: &str) -> Option<&Position> {
        self.active_positions.values().find(|p| p.instrument_id == instrument_id)
    }

    pub fn active_positions_of<'a>(&'a self, strategy_id: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.active_positions.values().filter(move |p| p.strategy_id == strategy_id)
    }

    /// Whether `strategy_id` still owns an active order or position.
    pub fn has_activity_for(&self, strategy_id: &str) -> bool {
        self.active_orders.values().any(|o| o.strategy_id == strategy_id)
            || self.active_positions_of(strategy_id).next().is_some()
    }

    pub fn realised_pnl(&self) -> f64 {
        self.closed_positions.values().filter_map(Position::pnl).sum()
    }

    // ── Moves ────────────────────────────────────────────────────────────────

    pub fn add_active_order(&mut self, order: Order) -> Result<(), BookError> {
        if self.closed_orders.contains_key(&order.id) {
            return Err(BookError::AlreadyClosed(order.id));
        }
        self.active_orders.insert(order.id, order);
        Ok(())
    }

    /// Move a filled order to the closed map, replacing the active copy with
    /// the completed one.
    pub fn complete_order(&mut self, order: Order) -> Result<(), BookError> {
        if self.active_orders.remove(&order.id).is_none() {
            return Err(BookError::OrderNotActive(order.id));
        }
        self.closed_orders.insert(order.id, order);
        Ok(())
    }

    /// Drop an active order without recording it as closed.
    pub fn discard_order(&mut self, order_id: Uuid) -> Result<Order, BookError> {
        self.active_orders.remove(&order_id).ok_or(BookError::OrderNotActive(order_id))
    }

    pub fn add_active_position(&mut self, position: Position) -> Result<(), BookError> {
        if self.closed_positions.contains_key(&position.id) {
            return Err(BookError::AlreadyClosed(position.id));
        }
        self.active_positions.insert(position.id, position);
        Ok(())
    }

    pub fn close_position(
        &mut self,
        position_id: Uuid,
        reason: ExitReason,
        price: f64,
    ) -> Result<Position, BookError> {
        let mut position = self
            .active_positions
            .remove(&position_id)
            .ok_or(BookError::PositionNotActive(position_id))?;
        position.close(reason, price);
        self.closed_positions.insert(position.id, position.clone());
        Ok(position)
    }

    pub fn clear(&mut self) {
        self.active_orders.clear();
        self.closed_orders.clear();
        self.active_positions.clear();
        self.closed_positions.clear();
    }
}

// ─── Published handle ─────────────────────────────────────────────────────────

/// Writer side of the book. Cloning a receiver from [`BookHandle::subscribe`]
/// is how everything outside the TradeManager reads it.
#[derive(Debug)]
pub struct BookHandle {
    tx: watch::Sender<TradeBook>,
}

impl BookHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TradeBook::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<TradeBook> {
        self.tx.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&TradeBook) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Apply `f` atomically: published only if it returns `Ok`.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&mut TradeBook) -> Result<R, E>) -> Result<R, E> {
        let mut next = self.tx.borrow().clone();
        let out = f(&mut next)?;
        self.tx.send_replace(next);
        Ok(out)
    }

    /// Publish an empty book.
    pub fn clear(&self) {
        self.tx.send_replace(TradeBook::default());
    }
}

impl Default for BookHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::settings::StrategySettings;

    fn order() -> Order {
        Order::opening("s1", &StrategySettings::default(), Direction::Long, 450.0, 1, 1.0)
    }

    #[test]
    fn failed_transaction_publishes_nothing() {
        let book = BookHandle::new();
        let rx = book.subscribe();
        let o = order();
        let id = o.id;

        let res: Result<(), BookError> = book.transaction(|b| {
            b.add_active_order(o)?;
            b.discard_order(Uuid::new_v4())?;
            Ok(())
        });
        assert!(res.is_err());
        assert!(rx.borrow().active_orders.is_empty());
        assert!(!rx.borrow().active_orders.contains_key(&id));
    }

    #[test]
    fn fill_moves_order_and_position_together() {
        let book = BookHandle::new();
        let mut rx = book.subscribe();
        let o = order();
        book.transaction(|b| b.add_active_order(o.clone())).unwrap();
        rx.mark_unchanged();

        let position = Position::open("QQQ", o.instrument_id.clone(), Direction::Long, 2.0, 1, "s1");
        book.transaction(|b| {
            b.add_active_position(position.clone())?;
            b.complete_order(o.clone())
        })
        .unwrap();

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.active_orders.is_empty());
        assert!(snapshot.closed_orders.contains_key(&o.id));
        assert!(snapshot.active_positions.contains_key(&position.id));
    }

    #[test]
    fn closed_ids_never_return_to_active() {
        let mut book = TradeBook::default();
        let o = order();
        book.add_active_order(o.clone()).unwrap();
        book.complete_order(o.clone()).unwrap();
        assert_eq!(book.add_active_order(o.clone()), Err(BookError::AlreadyClosed(o.id)));
        assert_eq!(book.complete_order(o.clone()), Err(BookError::OrderNotActive(o.id)));

        let p = Position::open("QQQ", "QQQ-C-450", Direction::Long, 2.0, 1, "s1");
        book.add_active_position(p.clone()).unwrap();
        let closed = book.close_position(p.id, ExitReason::TakeProfit, 2.7).unwrap();
        assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
        assert!((book.realised_pnl() - 0.7).abs() < 1e-9);
        assert_eq!(book.add_active_position(p.clone()), Err(BookError::AlreadyClosed(p.id)));
    }

    #[test]
    fn activity_is_tracked_per_strategy() {
        let mut book = TradeBook::default();
        let owner = String::from("s1");
        assert!(!book.has_activity_for(&owner));

        let o = order();
        book.add_active_order(o.clone()).unwrap();
        assert!(book.has_activity_for(&owner));
        assert!(!book.has_activity_for("s2"));

        book.complete_order(o).unwrap();
        book.add_active_position(Position::open("QQQ", "QQQ-C-450", Direction::Long, 2.0, 1, "s1")).unwrap();
        book.add_active_position(Position::open("SPY", "SPY-P-520", Direction::Short, 1.5, 1, "s2")).unwrap();
        let owned: Vec<&str> = book.active_positions_of(&owner).map(|p| p.instrument_id.as_str()).collect();
        assert_eq!(owned, vec!["QQQ-C-450"]);
        assert!(book.has_activity_for(&owner));
    }
}
