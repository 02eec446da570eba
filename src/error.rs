//! # error
//!
//! Centralised HTTP error type.
//!
//! Every handler returns `Result<_, AppError>`. The `IntoResponse` impl turns
//! it into a `{ "ok": false, "error": "…" }` JSON body so the dashboard always
//! gets a machine-readable response. Domain errors live next to their
//! modules and convert into `AppError` here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::settings::SettingsError;
use crate::trade_manager::{BookError, TradeError};

pub use crate::automation::{AutomationError, DriverError};

#[derive(Debug, Error)]
pub enum AppError {
    /// The payload parsed but is outside the accepted domain.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The trade manager task is gone.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<TradeError> for AppError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::OrderNotActive(_)
            | TradeError::UnknownStrategy(_)
            | TradeError::Book(BookError::OrderNotActive(_) | BookError::PositionNotActive(_)) => {
                AppError::NotFound(err.to_string())
            }
            TradeError::Stopped => AppError::Unavailable(err.to_string()),
            TradeError::Book(BookError::AlreadyClosed(_)) => AppError::Internal(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
