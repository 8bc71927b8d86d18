//! Entitlement Service: decides whether a user may use a tool and records
//! purchases that unlock one.
//!
//! Every store failure is absorbed here. Reads fail closed (not entitled,
//! empty list), writes report `false`. Nothing store-specific reaches callers.
//!
//! A purchase is two independent writes: the entitlement record (binding) and
//! a ledger entry (audit). The record is written first; if the ledger append
//! then fails the purchase still counts and the gap is logged for
//! reconciliation.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ProductCatalog;
use crate::entitlement::expiry::{is_active, Clock, SystemClock};
use crate::entitlement::ledger::PurchaseLedger;
use crate::entitlement::payment::{PaymentVerifier, TrustedConfirmation};
use crate::entitlement::store::{EntitlementStore, StoreError};
use crate::models::entitlement::{
    EntitlementRecord, EntitlementStatus, LedgerEntry, AI_TOOL_PURCHASE,
};

pub const DEFAULT_TERM_DAYS: i64 = 90;

/// Bounded exponential backoff applied to store reads only.
/// Writes are never retried.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl ReadRetryPolicy {
    fn delay_before(&self, retry: u32) -> Duration {
        // 1x, 2x, 4x ... the base delay, saturating instead of overflowing
        self.base_delay
            .checked_mul(1u32 << retry.saturating_sub(1).min(16))
            .unwrap_or(Duration::MAX)
    }
}

pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
    ledger: Arc<dyn PurchaseLedger>,
    verifier: Arc<dyn PaymentVerifier>,
    clock: Arc<dyn Clock>,
    catalog: ProductCatalog,
    term: chrono::Duration,
    read_retry: ReadRetryPolicy,
}

impl EntitlementService {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        ledger: Arc<dyn PurchaseLedger>,
        catalog: ProductCatalog,
    ) -> Self {
        Self {
            store,
            ledger,
            verifier: Arc::new(TrustedConfirmation),
            clock: Arc::new(SystemClock),
            catalog,
            term: chrono::Duration::days(DEFAULT_TERM_DAYS),
            read_retry: ReadRetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn PaymentVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_term_days(mut self, days: i64) -> Self {
        self.term = chrono::Duration::days(days);
        self
    }

    pub fn with_read_retry(mut self, policy: ReadRetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Whether `user_id` may use `tool_id` right now.
    ///
    /// Anonymous callers are never entitled, not even to free tools. Free
    /// tools skip the store entirely.
    pub async fn is_entitled(&self, user_id: Option<&str>, tool_id: &str) -> bool {
        let (Some(user_id), Some(tool_id)) = (identity(user_id), tool_key(tool_id)) else {
            return false;
        };
        if self.catalog.is_free(tool_id) {
            return true;
        }

        let record = self
            .read_with_retry("get", move || self.store.get(user_id, tool_id))
            .await;

        match record {
            Ok(Some(record)) => is_active(&record, self.clock.now()),
            Ok(None) => false,
            Err(e) => {
                error!("Entitlement read failed for user {user_id} tool {tool_id}, denying: {e}");
                false
            }
        }
    }

    /// Tool ids with a stored, unexpired entitlement. Free tools are not
    /// included unless the user also holds a record for them.
    pub async fn list_active_tools(&self, user_id: Option<&str>) -> BTreeSet<String> {
        let Some(user_id) = identity(user_id) else {
            return BTreeSet::new();
        };

        match self
            .read_with_retry("list", move || self.store.list(user_id))
            .await
        {
            Ok(records) => {
                let now = self.clock.now();
                records
                    .into_iter()
                    .filter(|r| is_active(r, now))
                    .map(|r| r.tool_id)
                    .collect()
            }
            Err(e) => {
                error!("Entitlement listing failed for user {user_id}: {e}");
                BTreeSet::new()
            }
        }
    }

    /// Grants `tool_id` to `user_id` for one term starting now.
    ///
    /// Returns `true` iff the entitlement record was written. A repeat call
    /// restarts the term and appends another ledger entry.
    pub async fn record_purchase(
        &self,
        user_id: Option<&str>,
        tool_id: &str,
        payment_id: &str,
    ) -> bool {
        let Some(user_id) = identity(user_id) else {
            warn!("Rejected purchase of {tool_id}: no authenticated user");
            return false;
        };
        let payment_id = payment_id.trim();
        let Some(tool_id) = tool_key(tool_id).filter(|_| !payment_id.is_empty()) else {
            warn!("Rejected purchase for user {user_id}: tool id and payment id are required");
            return false;
        };

        if self.catalog.get(tool_id).is_none() {
            warn!("Purchase of uncatalogued tool {tool_id}, recording amount 0");
        }
        let amount = self.catalog.amount_for(tool_id);

        match self.verifier.verify(payment_id, tool_id, amount).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Payment {payment_id} for {tool_id} was not confirmed, not granting access");
                return false;
            }
            Err(e) => {
                error!("Payment verification failed for {payment_id}: {e}");
                return false;
            }
        }

        let now = self.clock.now();
        let record = EntitlementRecord {
            user_id: user_id.to_string(),
            tool_id: tool_id.to_string(),
            payment_id: payment_id.to_string(),
            purchased_at: Some(now),
            expires_at: Some(now + self.term),
            status: EntitlementStatus::Active,
        };

        if let Err(e) = self.store.put(&record).await {
            error!(
                "Entitlement write failed for user {user_id} tool {tool_id} payment {payment_id}: {e}"
            );
            return false;
        }
        info!("Granted {tool_id} to user {user_id} until {}", now + self.term);

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            tool_id: record.tool_id,
            payment_id: record.payment_id,
            amount,
            entry_type: AI_TOOL_PURCHASE.to_string(),
            created_at: now,
        };
        if let Err(e) = self.ledger.append(&entry).await {
            error!(
                target: "audit",
                user_id = %entry.user_id,
                tool_id = %entry.tool_id,
                payment_id = %entry.payment_id,
                amount = entry.amount,
                "Ledger append failed after entitlement was granted: {e}"
            );
        }

        true
    }

    /// Current record for every tool the user ever bought, newest purchase
    /// first. Records missing `purchased_at` sort last.
    pub async fn purchase_history(&self, user_id: Option<&str>) -> Vec<EntitlementRecord> {
        let Some(user_id) = identity(user_id) else {
            return Vec::new();
        };

        match self
            .read_with_retry("list", move || self.store.list(user_id))
            .await
        {
            Ok(mut records) => {
                // None < Some(_), so descending order leaves missing timestamps at the end.
                records.sort_by(|a, b| {
                    b.purchased_at
                        .cmp(&a.purchased_at)
                        .then_with(|| a.tool_id.cmp(&b.tool_id))
                });
                records
            }
            Err(e) => {
                error!("Purchase history read failed for user {user_id}: {e}");
                Vec::new()
            }
        }
    }

    async fn read_with_retry<T, F, Fut>(&self, op: &str, mut read: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.read_retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match read().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.read_retry.delay_before(attempt);
                    warn!(
                        "Store {op} attempt {attempt}/{attempts} failed, retrying after {}ms: {e}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Store {op} giving up after {attempt} attempts");
                    return Err(e);
                }
            }
        }
    }
}

/// Normalises a caller identity; blank ids count as anonymous.
fn identity(user_id: Option<&str>) -> Option<&str> {
    user_id.map(str::trim).filter(|u| !u.is_empty())
}

/// Tool ids are stored and looked up trimmed; a blank id names no tool.
fn tool_key(tool_id: &str) -> Option<&str> {
    Some(tool_id.trim()).filter(|t| !t.is_empty())
}
