//! # routes::feed
//!
//! Entry point of the indicator feed.
//!
//! | Method | Path             | Description                          |
//! |--------|------------------|--------------------------------------|
//! | POST   | `/api/feed/tick` | One per-symbol indicator record      |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::{error::AppError, models::IndicatorTick, state::SharedState};

/// Queue the tick for the TradeManager. Ticks are processed in arrival order;
/// the response only confirms the tick was accepted.
pub async fn push_tick(
    State(state): State<SharedState>,
    Json(tick): Json<IndicatorTick>,
) -> Result<impl IntoResponse, AppError> {
    if !tick.price.is_finite() || tick.price <= 0.0 {
        return Err(AppError::BadRequest(format!("invalid price {}", tick.price)));
    }

    let symbol = tick.symbol;
    let price = tick.price;
    state.manager.push_tick(tick).await?;

    Ok(Json(json!({
        "ok":     true,
        "symbol": symbol,
        "price":  price,
    })))
}
