//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "livelist-server",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": {
            "active": state.connections.active_count(),
            "max": state.connections.max_connections(),
        },
        "subscriptions": {
            "channels": state.registry.channel_count(),
            "listeners": state.registry.listener_count(),
        },
    }))
}
