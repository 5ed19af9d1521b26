use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app_state::AppState;

pub async fn hello() -> &'static str {
    "stranger-chat is running"
}

/// Liveness plus the number of open websocket connections.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.websocket_manager.connection_count(),
    }))
}
