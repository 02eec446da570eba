//! # routes::settings
//!
//! | Method | Path            | Description                                   |
//! |--------|-----------------|-----------------------------------------------|
//! | GET    | `/api/settings` | Current settings snapshot + derived strategy id |
//! | PUT    | `/api/settings` | Replace the snapshot (validated)              |
//!
//! A changed snapshot makes the TradeManager start a new strategy and demote
//! the current one; an identical snapshot changes nothing.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::{error::AppError, settings::StrategySettings, state::SharedState};

pub async fn get_settings(State(state): State<SharedState>) -> impl IntoResponse {
    let settings = state.settings.snapshot();
    Json(json!({
        "ok":         true,
        "strategyId": settings.strategy_id(),
        "settings":   settings,
    }))
}

pub async fn put_settings(
    State(state): State<SharedState>,
    Json(next): Json<StrategySettings>,
) -> Result<impl IntoResponse, AppError> {
    state.settings.update(next.clone())?;
    info!(strategy_id = %next.strategy_id(), "⚙️  Settings updated via API");

    Ok(Json(json!({
        "ok":         true,
        "strategyId": next.strategy_id(),
        "settings":   next,
    })))
}
