pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::entitlement::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/catalog", get(handlers::handle_get_catalog))
        .route("/api/v1/entitlements", get(handlers::handle_list_active))
        .route(
            "/api/v1/entitlements/:tool_id",
            get(handlers::handle_check_entitlement),
        )
        .route(
            "/api/v1/purchases",
            post(handlers::handle_record_purchase).get(handlers::handle_purchase_history),
        )
        .with_state(state)
}
