//! Domain models shared by the strategy, order and monitoring layers.

pub mod indicator;
pub mod position;
pub mod signal;

pub use indicator::{IndicatorTick, MarketSnapshot};
pub use position::Position;
pub use signal::{Direction, ExitReason, Signal};
