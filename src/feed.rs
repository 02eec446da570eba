//! # feed
//!
//! [`FeedAggregator`] turns the per-symbol indicator stream into
//! [`MarketSnapshot`]s. Each incoming tick is paired with the latest tick of
//! its confirmation symbol; the snapshot's primary side is always the symbol
//! that just ticked, so a Strategy only decides on ticks of its own symbol.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{IndicatorTick, MarketSnapshot};
use crate::settings::TradeSymbol;

#[derive(Debug, Default)]
pub struct FeedAggregator {
    latest: BTreeMap<TradeSymbol, IndicatorTick>,
}

impl FeedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tick` and return the snapshot it completes, if the
    /// confirmation symbol has ticked at least once.
    ///
    /// A tick older than the latest one already seen for its symbol is
    /// dropped, so no snapshot is ever evaluated twice or out of order.
    pub fn push(&mut self, tick: IndicatorTick) -> Option<MarketSnapshot> {
        let symbol = tick.symbol;
        if let Some(previous) = self.latest.get(&symbol) {
            if tick.time < previous.time {
                debug!(%symbol, "Out-of-order indicator tick dropped");
                return None;
            }
        }
        self.latest.insert(symbol, tick);

        let primary = self.latest.get(&symbol)?;
        let confirmation = self.latest.get(&symbol.confirmation())?;
        MarketSnapshot::for_symbol(symbol, primary, confirmation)
    }

    pub fn latest(&self, symbol: TradeSymbol) -> Option<&IndicatorTick> {
        self.latest.get(&symbol)
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}
