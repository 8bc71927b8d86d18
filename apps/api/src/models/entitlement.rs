use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag stored on every ledger row written by this service, so other purchase
/// types can share the ledger table.
pub const AI_TOOL_PURCHASE: &str = "ai_tool_purchase";

/// Persisted entitlement status. Expiry is derived on read, so `Active` is the
/// only value ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::Active => "active",
        }
    }
}

impl std::str::FromStr for EntitlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntitlementStatus::Active),
            other => Err(format!("unknown entitlement status '{other}'")),
        }
    }
}

/// Current-state projection for one (user, tool) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    pub user_id: String,
    pub tool_id: String,
    pub payment_id: String,
    pub purchased_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: EntitlementStatus,
}

/// Immutable purchase event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub tool_id: String,
    pub payment_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub created_at: DateTime<Utc>,
}
