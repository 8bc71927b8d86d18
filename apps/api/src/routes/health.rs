use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Liveness plus the size of the catalog this process loaded at startup.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "paywall-api",
        "version": env!("CARGO_PKG_VERSION"),
        "catalogTools": state.entitlements.catalog().tool_ids().count()
    }))
}
