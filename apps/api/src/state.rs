use std::sync::Arc;

use crate::entitlement::service::EntitlementService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub entitlements: Arc<EntitlementService>,
}
