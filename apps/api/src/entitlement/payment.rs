//! Payment confirmation checks performed before an entitlement is granted.
//!
//! The checkout widget hands us an opaque confirmation token. By default that
//! token is trusted as-is (`TrustedConfirmation`). When a gateway lookup URL is
//! configured, `GatewayVerifier` re-queries the gateway by payment id and only
//! accepts settled payments whose amount matches the tool's catalog price.
//!
//! A settled token is not consumed: the same id presented for another tool
//! with the same price is accepted again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const GATEWAY_TIMEOUT_SECS: u64 = 10;
const SETTLED_STATUSES: [&str; 3] = ["captured", "succeeded", "paid"];

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// `Ok(true)` when the token denotes a completed charge of
    /// `expected_amount` for this tool.
    async fn verify(
        &self,
        payment_id: &str,
        tool_id: &str,
        expected_amount: i64,
    ) -> Result<bool, PaymentError>;
}

/// Accepts any non-empty confirmation token supplied by the checkout flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedConfirmation;

#[async_trait]
impl PaymentVerifier for TrustedConfirmation {
    async fn verify(
        &self,
        payment_id: &str,
        _tool_id: &str,
        _expected_amount: i64,
    ) -> Result<bool, PaymentError> {
        Ok(!payment_id.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GatewayPayment {
    id: String,
    status: String,
    /// Charged amount, in the same unit as the catalog prices.
    amount: Option<i64>,
}

impl GatewayPayment {
    fn is_settled_for(&self, payment_id: &str, expected_amount: i64) -> bool {
        self.id == payment_id
            && self.amount == Some(expected_amount)
            && SETTLED_STATUSES
                .iter()
                .any(|s| self.status.eq_ignore_ascii_case(s))
    }
}

/// Looks the payment up at `{base_url}/{payment_id}` with a bearer key.
#[derive(Clone)]
pub struct GatewayVerifier {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl GatewayVerifier {
    pub fn new(base_url: String, api_key: String) -> Result<Self, PaymentError> {
        let base_url =
            Url::parse(&base_url).map_err(|e| PaymentError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PaymentError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Appends the payment id as a single, percent-encoded path segment.
    fn payment_url(&self, payment_id: &str) -> Result<Url, PaymentError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PaymentError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(payment_id);
        Ok(url)
    }
}

#[async_trait]
impl PaymentVerifier for GatewayVerifier {
    async fn verify(
        &self,
        payment_id: &str,
        tool_id: &str,
        expected_amount: i64,
    ) -> Result<bool, PaymentError> {
        if payment_id.trim().is_empty() {
            return Ok(false);
        }

        let response = self
            .client
            .get(self.payment_url(payment_id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("Payment {payment_id} for {tool_id} not found at gateway");
            return Ok(false);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        let payment: GatewayPayment = response.json().await?;
        let settled = payment.is_settled_for(payment_id, expected_amount);
        if !settled {
            warn!(
                "Payment {payment_id} rejected for {tool_id}: status={} amount={:?} expected={expected_amount}",
                payment.status, payment.amount
            );
        }
        debug!("Gateway check for {payment_id} on {tool_id}: settled={settled}");
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::{json, Value};

    fn payment(id: &str, status: &str, amount: Option<i64>) -> GatewayPayment {
        GatewayPayment {
            id: id.to_string(),
            status: status.to_string(),
            amount,
        }
    }

    /// Serves `GET /payments/:id` from a fixed table on an ephemeral port.
    async fn spawn_gateway() -> String {
        async fn lookup(Path(id): Path<String>) -> Result<Json<Value>, AxumStatus> {
            match id.as_str() {
                "pay_cheap" => Ok(Json(json!({"id": "pay_cheap", "status": "captured", "amount": 99}))),
                "pay_ats" => Ok(Json(json!({"id": "pay_ats", "status": "captured", "amount": 149}))),
                "pay_pending" => Ok(Json(json!({"id": "pay_pending", "status": "created", "amount": 149}))),
                "pay_down" => Err(AxumStatus::SERVICE_UNAVAILABLE),
                _ => Err(AxumStatus::NOT_FOUND),
            }
        }

        let app = Router::new().route("/payments/:id", get(lookup));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/payments")
    }

    #[tokio::test]
    async fn test_trusted_confirmation_accepts_any_token() {
        assert!(TrustedConfirmation
            .verify("pay_123", "ats-checker", 149)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_trusted_confirmation_rejects_blank_token() {
        assert!(!TrustedConfirmation
            .verify("  ", "ats-checker", 149)
            .await
            .unwrap());
    }

    #[test]
    fn test_captured_payment_with_matching_amount_is_settled() {
        assert!(payment("pay_1", "captured", Some(149)).is_settled_for("pay_1", 149));
        assert!(payment("pay_1", "SUCCEEDED", Some(149)).is_settled_for("pay_1", 149));
    }

    #[test]
    fn test_amount_mismatch_is_not_settled() {
        assert!(!payment("pay_1", "captured", Some(99)).is_settled_for("pay_1", 149));
        assert!(!payment("pay_1", "captured", None).is_settled_for("pay_1", 149));
    }

    #[test]
    fn test_pending_payment_is_not_settled() {
        assert!(!payment("pay_1", "authorized", Some(149)).is_settled_for("pay_1", 149));
        assert!(!payment("pay_1", "failed", Some(149)).is_settled_for("pay_1", 149));
    }

    #[test]
    fn test_mismatched_id_is_not_settled() {
        assert!(!payment("pay_2", "captured", Some(149)).is_settled_for("pay_1", 149));
    }

    #[test]
    fn test_gateway_payload_ignores_extra_fields() {
        let parsed: GatewayPayment = serde_json::from_str(
            r#"{"id": "pay_1", "status": "captured", "amount": 149, "currency": "INR"}"#,
        )
        .unwrap();
        assert!(parsed.is_settled_for("pay_1", 149));
    }

    #[test]
    fn test_payment_id_is_encoded_as_one_segment() {
        let verifier =
            GatewayVerifier::new("https://pay.example.com/v1/payments/".into(), "key".into())
                .unwrap();
        assert_eq!(
            verifier.payment_url("pay_1").unwrap().as_str(),
            "https://pay.example.com/v1/payments/pay_1"
        );
        assert_eq!(
            verifier.payment_url("a/b?c#d").unwrap().as_str(),
            "https://pay.example.com/v1/payments/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            GatewayVerifier::new("not a url".into(), "key".into()),
            Err(PaymentError::InvalidUrl(_))
        ));
        assert!(matches!(
            GatewayVerifier::new("mailto:pay@example.com".into(), "key".into()),
            Err(PaymentError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_binds_payment_to_tool_price() {
        let verifier = GatewayVerifier::new(spawn_gateway().await, "key".into()).unwrap();

        assert!(verifier.verify("pay_cheap", "cover-letter", 99).await.unwrap());
        assert!(!verifier.verify("pay_cheap", "skill-gap", 199).await.unwrap());
        assert!(!verifier.verify("pay_cheap", "ats-checker", 149).await.unwrap());
        assert!(verifier.verify("pay_ats", "ats-checker", 149).await.unwrap());
    }

    #[tokio::test]
    async fn test_gateway_rejects_unsettled_and_unknown_payments() {
        let verifier = GatewayVerifier::new(spawn_gateway().await, "key".into()).unwrap();

        assert!(!verifier.verify("pay_pending", "ats-checker", 149).await.unwrap());
        assert!(!verifier.verify("pay_missing", "ats-checker", 149).await.unwrap());
    }

    #[tokio::test]
    async fn test_gateway_outage_is_an_error() {
        let verifier = GatewayVerifier::new(spawn_gateway().await, "key".into()).unwrap();

        let err = verifier.verify("pay_down", "ats-checker", 149).await.unwrap_err();
        assert!(matches!(err, PaymentError::Gateway { status: 503, .. }));
    }
}
