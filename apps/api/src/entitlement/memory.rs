//! In-memory store, ledger and clock used by the unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::entitlement::expiry::Clock;
use crate::entitlement::ledger::PurchaseLedger;
use crate::entitlement::store::{EntitlementStore, StoreError};
use crate::models::entitlement::{EntitlementRecord, LedgerEntry};

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    records: Mutex<HashMap<(String, String), EntitlementRecord>>,
    failing_reads: AtomicU32,
    fail_writes: AtomicBool,
    reads: AtomicU32,
}

impl InMemoryEntitlementStore {
    /// The next `n` reads fail as if the pool had timed out.
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Inserts a record directly, bypassing the service.
    pub fn seed(&self, record: EntitlementRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((record.user_id.clone(), record.tool_id.clone()), record);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn check_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(
        &self,
        user_id: &str,
        tool_id: &str,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        self.check_read()?;
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(user_id.to_string(), tool_id.to_string()))
            .cloned())
    }

    async fn put(&self, record: &EntitlementRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.seed(record.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<EntitlementRecord>, StoreError> {
        self.check_read()?;
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    fail: AtomicBool,
}

impl InMemoryLedger {
    pub fn fail_appends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_for(&self, user_id: &str, tool_id: &str) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.user_id == user_id && e.tool_id == tool_id)
            .collect()
    }
}

#[async_trait]
impl PurchaseLedger for InMemoryLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
