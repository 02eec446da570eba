//! # state
//!
//! AppState shared by every axum handler. The trading core itself lives on
//! the TradeManager task; handlers only talk to it through its handle and read
//! the published book and strategy views.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::settings::Settings;
use crate::trade_manager::ManagerHandle;

/// Capacity of the dashboard event channel.
const MONITOR_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    /// Observable strategy settings; updates reach the manager through its
    /// own subscription.
    pub settings: Settings,

    /// Front door to the TradeManager task.
    pub manager: ManagerHandle,

    /// Pre-serialized monitor events for websocket clients.
    pub broadcast_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(settings: Settings, manager: ManagerHandle, broadcast_tx: broadcast::Sender<String>) -> Self {
        Self { settings, manager, broadcast_tx }
    }
}

pub type SharedState = Arc<AppState>;

/// Channel the TradeManager and the websocket handler share.
pub fn monitor_channel() -> broadcast::Sender<String> {
    broadcast::channel(MONITOR_CAPACITY).0
}

pub fn build_state(settings: Settings, manager: ManagerHandle, broadcast_tx: broadcast::Sender<String>) -> SharedState {
    Arc::new(AppState::new(settings, manager, broadcast_tx))
}
