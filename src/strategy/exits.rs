//! # strategy::exits
//!
//! Closure rules for an open position intent, checked in priority order:
//!
//! ```text
//! 1. Take-profit        price reached entry ± tp/100
//! 2. Trailing stop      price retraced stop/100 from the running extreme
//! 3. Flow threshold     call (LONG) / put (SHORT) flow fell below minimum
//! 4. Cumulative flow    market flipped to the opposite condition
//! ```
//!
//! The first rule that fires wins.

use crate::models::{Direction, ExitReason};
use crate::settings::StrategySettings;

use super::{MarketCondition, PositionIntent};

/// Take-profit level. `None` when take-profit is disabled (`amount <= 0`).
pub fn take_profit_target(intent: &PositionIntent, amount: f64) -> Option<f64> {
    if amount <= 0.0 {
        return None;
    }
    let distance = amount / 100.0;
    Some(match intent.direction {
        Direction::Long => intent.price + distance,
        Direction::Short => intent.price - distance,
    })
}

pub fn take_profit_hit(intent: &PositionIntent, price: f64, amount: f64) -> bool {
    match (take_profit_target(intent, amount), intent.direction) {
        (Some(target), Direction::Long) => price >= target,
        (Some(target), Direction::Short) => price <= target,
        (None, _) => false,
    }
}

/// Trailing-stop level from the running extreme. `None` when disabled.
pub fn trailing_stop_level(intent: &PositionIntent, amount: f64) -> Option<f64> {
    if amount <= 0.0 {
        return None;
    }
    let distance = amount / 100.0;
    Some(match intent.direction {
        Direction::Long => intent.max_price - distance,
        Direction::Short => intent.min_price + distance,
    })
}

/// Expects the intent's running extremes to already include `price`.
pub fn trailing_stop_hit(intent: &PositionIntent, price: f64, amount: f64) -> bool {
    match (trailing_stop_level(intent, amount), intent.direction) {
        (Some(level), Direction::Long) => price <= level,
        (Some(level), Direction::Short) => price >= level,
        (None, _) => false,
    }
}

pub fn flow_threshold_hit(direction: Direction, market: &MarketCondition) -> bool {
    match direction {
        Direction::Long => market.call_flow_below_min(),
        Direction::Short => market.put_flow_below_min(),
    }
}

pub fn cumulative_reversal_hit(direction: Direction, market: &MarketCondition) -> bool {
    match direction {
        Direction::Long => market.is_bearish,
        Direction::Short => market.is_bullish,
    }
}

/// Update the running extremes with `price`, then evaluate every rule in
/// priority order.
pub fn check_exit(
    intent: &mut PositionIntent,
    price: f64,
    market: &MarketCondition,
    settings: &StrategySettings,
) -> Option<ExitReason> {
    intent.max_price = intent.max_price.max(price);
    intent.min_price = intent.min_price.min(price);

    if take_profit_hit(intent, price, settings.take_profit_amount) {
        Some(ExitReason::TakeProfit)
    } else if trailing_stop_hit(intent, price, settings.stop_loss_amount) {
        Some(ExitReason::TrailingStop)
    } else if flow_threshold_hit(intent.direction, market) {
        Some(ExitReason::FlowThreshold)
    } else if cumulative_reversal_hit(intent.direction, market) {
        Some(ExitReason::CumulativeFlow)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn intent(direction: Direction, price: f64) -> PositionIntent {
        PositionIntent { direction, price, max_price: price, min_price: price, opened_at: Utc::now() }
    }

    fn calm() -> MarketCondition {
        MarketCondition::default()
    }

    fn settings(tp: f64, sl: f64) -> StrategySettings {
        StrategySettings { take_profit_amount: tp, stop_loss_amount: sl, ..StrategySettings::default() }
    }

    #[test]
    fn take_profit_triggers_at_target() {
        // Entry 100, take-profit 70 → $0.70 target at 100.70.
        let mut long = intent(Direction::Long, 100.0);
        assert_eq!(check_exit(&mut long, 100.69, &calm(), &settings(70.0, 100.0)), None);
        assert_eq!(
            check_exit(&mut long, 100.70, &calm(), &settings(70.0, 100.0)),
            Some(ExitReason::TakeProfit)
        );

        let mut short = intent(Direction::Short, 100.0);
        assert_eq!(
            check_exit(&mut short, 99.30, &calm(), &settings(70.0, 100.0)),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn trailing_stop_follows_the_running_max() {
        let s = settings(10_000.0, 100.0);
        let mut long = intent(Direction::Long, 100.0);

        assert_eq!(check_exit(&mut long, 105.0, &calm(), &s), None);
        assert_eq!(long.max_price, 105.0);
        assert_eq!(trailing_stop_level(&long, 100.0), Some(104.0));

        assert_eq!(check_exit(&mut long, 104.5, &calm(), &s), None);
        // Boundary is inclusive: 104.00 <= 105 - 1.00.
        assert_eq!(check_exit(&mut long.clone(), 104.0, &calm(), &s), Some(ExitReason::TrailingStop));
        assert_eq!(check_exit(&mut long, 103.99, &calm(), &s), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn trailing_stop_for_short_uses_running_min() {
        let s = settings(10_000.0, 50.0);
        let mut short = intent(Direction::Short, 100.0);
        assert_eq!(check_exit(&mut short, 98.0, &calm(), &s), None);
        assert_eq!(check_exit(&mut short, 98.4, &calm(), &s), None);
        assert_eq!(check_exit(&mut short, 98.5, &calm(), &s), Some(ExitReason::TrailingStop));
    }

    #[test]
    fn non_positive_stop_disables_trailing() {
        let s = settings(10_000.0, 0.0);
        let mut long = intent(Direction::Long, 100.0);
        check_exit(&mut long, 110.0, &calm(), &s);
        assert_eq!(check_exit(&mut long, 50.0, &calm(), &s), None);
    }

    #[test]
    fn flow_rules_follow_priority() {
        let s = settings(70.0, 100.0);
        let market = MarketCondition {
            is_bearish: true,
            primary_call_below_min: true,
            ..MarketCondition::default()
        };

        let mut long = intent(Direction::Long, 100.0);
        assert_eq!(check_exit(&mut long, 100.1, &market, &s), Some(ExitReason::FlowThreshold));

        let reversal = MarketCondition { is_bearish: true, ..MarketCondition::default() };
        let mut long = intent(Direction::Long, 100.0);
        assert_eq!(check_exit(&mut long, 100.1, &reversal, &s), Some(ExitReason::CumulativeFlow));

        // Take-profit outranks every flow rule.
        let mut long = intent(Direction::Long, 100.0);
        assert_eq!(check_exit(&mut long, 101.0, &market, &s), Some(ExitReason::TakeProfit));
    }
}
