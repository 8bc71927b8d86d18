use async_trait::async_trait;
use sqlx::PgPool;

use crate::entitlement::store::StoreError;
use crate::models::entitlement::LedgerEntry;

/// Append-only log of purchase events.
///
/// Rows are never updated or deleted once written.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError>;
}

/// PostgreSQL-backed ledger over the `purchase_ledger` table.
#[derive(Clone)]
pub struct PgPurchaseLedger {
    pool: PgPool,
}

impl PgPurchaseLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseLedger for PgPurchaseLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO purchase_ledger
                (id, user_id, tool_id, payment_id, amount, entry_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.tool_id)
        .bind(&entry.payment_id)
        .bind(entry.amount)
        .bind(&entry.entry_type)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
