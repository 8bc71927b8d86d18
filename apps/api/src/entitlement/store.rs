use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::models::entitlement::{EntitlementRecord, EntitlementStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Persistent (user, tool) entitlement records.
///
/// `put` is an upsert: a repeat purchase replaces the previous record.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get(&self, user_id: &str, tool_id: &str)
        -> Result<Option<EntitlementRecord>, StoreError>;

    async fn put(&self, record: &EntitlementRecord) -> Result<(), StoreError>;

    /// Every record held for a user, in no particular order.
    async fn list(&self, user_id: &str) -> Result<Vec<EntitlementRecord>, StoreError>;
}

#[derive(Debug, FromRow)]
struct EntitlementRow {
    user_id: String,
    tool_id: String,
    payment_id: String,
    purchased_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    status: String,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = StoreError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let status: EntitlementStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        Ok(EntitlementRecord {
            user_id: row.user_id,
            tool_id: row.tool_id,
            payment_id: row.payment_id,
            purchased_at: row.purchased_at,
            expires_at: row.expires_at,
            status,
        })
    }
}

/// PostgreSQL-backed store over the `tool_entitlements` table.
#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn get(
        &self,
        user_id: &str,
        tool_id: &str,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT user_id, tool_id, payment_id, purchased_at, expires_at, status
            FROM tool_entitlements
            WHERE user_id = $1 AND tool_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tool_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    async fn put(&self, record: &EntitlementRecord) -> Result<(), StoreError> {
        // Last write wins: renewal replaces the whole record, no merge.
        sqlx::query(
            r#"
            INSERT INTO tool_entitlements
                (user_id, tool_id, payment_id, purchased_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, tool_id) DO UPDATE SET
                payment_id   = EXCLUDED.payment_id,
                purchased_at = EXCLUDED.purchased_at,
                expires_at   = EXCLUDED.expires_at,
                status       = EXCLUDED.status
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.tool_id)
        .bind(&record.payment_id)
        .bind(record.purchased_at)
        .bind(record.expires_at)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<EntitlementRecord>, StoreError> {
        let rows: Vec<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT user_id, tool_id, payment_id, purchased_at, expires_at, status
            FROM tool_entitlements
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntitlementRecord::try_from).collect()
    }
}
