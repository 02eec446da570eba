//! HTTP / WebSocket shell around the trading core.

pub mod feed;
pub mod monitor;
pub mod session;
pub mod settings;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::SharedState;

/// Every route, without middleware (added by `main`).
pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Feed ──────────────────────────────────────────────────────────────
        .route("/api/feed/tick",           post(feed::push_tick))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",              get(monitor::ws_monitor))
        .route("/api/monitor/book",        get(monitor::get_book))
        .route("/api/monitor/strategies",  get(monitor::get_strategies))
        // ── Settings ──────────────────────────────────────────────────────────
        .route("/api/settings",            get(settings::get_settings).put(settings::put_settings))
        // ── Session ───────────────────────────────────────────────────────────
        .route("/api/session/reset",       post(session::reset_session))
        .route("/api/session/cleanup",     post(session::cleanup_strategies))
        .route("/api/orders/:id/cancel",   post(session::cancel_order))
        .route("/health",                  get(session::health_check))
        .with_state(state)
}
