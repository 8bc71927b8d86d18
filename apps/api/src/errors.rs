use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// The payment may have gone through but no entitlement was written.
    #[error("Purchase of {tool_id} could not be recorded")]
    PurchaseNotRecorded { tool_id: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::PurchaseNotRecorded { tool_id } => {
                tracing::error!("Purchase not recorded for tool {tool_id}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PURCHASE_NOT_RECORDED",
                    "Your payment was received but access could not be granted yet. \
                     Please contact support with your payment id."
                        .to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
