use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::catalog::ProductCatalog;
use crate::errors::AppError;
use crate::models::entitlement::EntitlementRecord;
use crate::state::AppState;

/// Header set by the upstream auth proxy once the user is authenticated.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, if any. Missing, blank or non-UTF-8 headers are
/// treated as anonymous rather than rejected.
pub struct Caller(pub Option<String>);

impl Caller {
    fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Caller(user_id))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    pub tool_id: String,
    pub entitled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveToolsResponse {
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub tool_id: String,
    pub payment_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub tool_id: String,
    pub recorded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseHistoryResponse {
    pub purchases: Vec<EntitlementRecord>,
}

/// GET /api/v1/catalog
pub async fn handle_get_catalog(State(state): State<AppState>) -> Json<ProductCatalog> {
    Json(state.entitlements.catalog().clone())
}

/// GET /api/v1/entitlements
pub async fn handle_list_active(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<ActiveToolsResponse> {
    let tools = state.entitlements.list_active_tools(caller.id()).await;
    Json(ActiveToolsResponse {
        tools: tools.into_iter().collect(),
    })
}

/// GET /api/v1/entitlements/:tool_id
pub async fn handle_check_entitlement(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    caller: Caller,
) -> Json<EntitlementResponse> {
    let entitled = state.entitlements.is_entitled(caller.id(), &tool_id).await;
    Json(EntitlementResponse { tool_id, entitled })
}

/// POST /api/v1/purchases
pub async fn handle_record_purchase(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let user_id = caller.id().ok_or(AppError::Unauthorized)?;
    if req.tool_id.trim().is_empty() {
        return Err(AppError::Validation("toolId is required".to_string()));
    }
    if req.payment_id.trim().is_empty() {
        return Err(AppError::Validation("paymentId is required".to_string()));
    }

    let recorded = state
        .entitlements
        .record_purchase(Some(user_id), &req.tool_id, &req.payment_id)
        .await;
    if !recorded {
        return Err(AppError::PurchaseNotRecorded {
            tool_id: req.tool_id,
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            tool_id: req.tool_id,
            recorded,
        }),
    ))
}

/// GET /api/v1/purchases
pub async fn handle_purchase_history(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<PurchaseHistoryResponse> {
    let purchases = state.entitlements.purchase_history(caller.id()).await;
    Json(PurchaseHistoryResponse { purchases })
}
