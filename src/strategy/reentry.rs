//! # strategy::reentry
//!
//! Re-entry gating after an exit.
//!
//! | last exit (same direction) | new entry allowed when                          |
//! |----------------------------|-------------------------------------------------|
//! | none / `NONE`              | always                                          |
//! | `FLOW_THRESHOLD`           | always                                          |
//! | `CUMULATIVE_FLOW`          | the market is back in the entry's condition     |
//! | `TAKE_PROFIT`              | cumulative flow widened by `wideningThreshold`  |
//! | `TRAILING_STOP`            | same as `TAKE_PROFIT`                           |
//! | anything else              | always                                          |

use serde::Serialize;

use crate::models::{Direction, ExitReason};

use super::MarketCondition;

/// What the Strategy remembers about its last exit. Only used for gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExitMemory {
    pub reason: ExitReason,
    pub direction: Option<Direction>,
    /// `(primary, confirmation)` cumulative flow at the moment of exit.
    pub cumulative: Option<(f64, f64)>,
}

impl ExitMemory {
    pub fn record(&mut self, reason: ExitReason, direction: Direction, cumulative: (f64, f64)) {
        self.reason = reason;
        self.direction = Some(direction);
        self.cumulative = Some(cumulative);
    }

    fn clear_reason(&mut self) {
        self.reason = ExitReason::None;
        self.direction = None;
    }
}

/// Whether a new entry in `direction` is allowed right now.
///
/// A satisfied `CUMULATIVE_FLOW` gate resets the memory so the next exit
/// starts from a clean slate.
pub fn can_reenter_direction(
    memory: &mut ExitMemory,
    direction: Direction,
    market: &MarketCondition,
    widening_threshold: f64,
) -> bool {
    if memory.reason == ExitReason::None || memory.direction != Some(direction) {
        return true;
    }

    match memory.reason {
        ExitReason::FlowThreshold => true,

        ExitReason::CumulativeFlow => {
            let back_in_condition = match direction {
                Direction::Long => market.is_bullish,
                Direction::Short => market.is_bearish,
            };
            if back_in_condition {
                memory.clear_reason();
            }
            back_in_condition
        }

        ExitReason::TakeProfit | ExitReason::TrailingStop => {
            let Some((exit_primary, exit_confirm)) = memory.cumulative else {
                return true;
            };
            let (primary, confirm) = market.cumulative;
            match direction {
                Direction::Long => {
                    primary >= exit_primary + widening_threshold
                        && confirm >= exit_confirm + widening_threshold
                }
                Direction::Short => {
                    primary <= exit_primary - widening_threshold
                        && confirm <= exit_confirm - widening_threshold
                }
            }
        }

        _ => true,
    }
}
