use chrono::{DateTime, Utc};

use crate::models::entitlement::EntitlementRecord;

/// Source of "now" for the entitlement service. Injected so expiry can be
/// tested without waiting ninety days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time of the API server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A record is active until the instant it expires. Records without an
/// expiry never lapse.
pub fn is_active(record: &EntitlementRecord, now: DateTime<Utc>) -> bool {
    record.expires_at.map_or(true, |expires_at| expires_at > now)
}
