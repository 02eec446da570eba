//! # routes::monitor
//!
//! Read-only dashboard endpoints.
//!
//! | Method    | Path                      | Description                          |
//! |-----------|---------------------------|--------------------------------------|
//! | GET (WS)  | `/ws/monitor`             | Snapshot, then every MonitorEvent    |
//! | GET       | `/api/monitor/book`       | The four order / position maps       |
//! | GET       | `/api/monitor/strategies` | Every live strategy, active one last |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Current snapshot first ───────────────────────────────────────────────
    let snapshot = json!({
        "event":      "SNAPSHOT",
        "book":       state.manager.book(),
        "strategies": state.manager.strategies(),
        "settings":   state.settings.snapshot(),
    })
    .to_string();

    if sender.send(Message::Text(snapshot.into())).await.is_err() {
        return; // Client closed before the snapshot went out
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            // MonitorEvent from the broadcast channel → forward to the client
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str.into())).await.is_err() {
                            break; // Client disconnect
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // Client reads too slowly; some events were skipped
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break, // Channel closed
                }
            }

            // Messages from the client (Ping / Close)
            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {} // Text/Binary from the dashboard is ignored
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST Monitoring Endpoints ────────────────────────────────────────────────

pub async fn get_book(State(state): State<SharedState>) -> impl IntoResponse {
    let book = state.manager.book();
    Json(json!({
        "ok":          true,
        "realisedPnl": book.realised_pnl(),
        "book":        book,
    }))
}

pub async fn get_strategies(State(state): State<SharedState>) -> impl IntoResponse {
    let strategies = state.manager.strategies();
    Json(json!({
        "ok":         true,
        "count":      strategies.len(),
        "strategies": strategies,
    }))
}
