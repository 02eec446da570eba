//! # routes::session
//!
//! Operator controls for the trading session.
//!
//! | Method | Path                      | Description                               |
//! |--------|---------------------------|-------------------------------------------|
//! | POST   | `/api/session/reset`      | Abort executions, clear book, fresh strategy |
//! | POST   | `/api/session/cleanup`    | Dispose idle demoted strategies           |
//! | POST   | `/api/orders/:id/cancel`  | Drop a stuck active order                 |
//! | GET    | `/health`                 | Liveness + book counters                  |

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::SharedState};

pub async fn reset_session(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    warn!("🔄 Session reset requested via API");
    let strategy_id = state.manager.reset().await?;
    Ok(Json(json!({
        "ok":         true,
        "strategyId": strategy_id,
    })))
}

pub async fn cleanup_strategies(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let disposed = state.manager.cleanup().await?;
    Ok(Json(json!({
        "ok":       true,
        "disposed": disposed,
    })))
}

pub async fn cancel_order(
    State(state): State<SharedState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.manager.cancel_order(order_id).await?;
    Ok(Json(json!({
        "ok":    true,
        "order": order,
    })))
}

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let book = state.manager.book();
    let active = state
        .manager
        .strategies()
        .into_iter()
        .find(|s| s.is_active)
        .map(|s| s.id);

    Json(json!({
        "ok":              true,
        "activeStrategy":  active,
        "activeOrders":    book.active_orders.len(),
        "activePositions": book.active_positions.len(),
    }))
}
