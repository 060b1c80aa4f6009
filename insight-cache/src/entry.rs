//! Cache entries and their liveness rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached payload with its insertion time and lifetime
///
/// Entries are never mutated once stored; `set` on an existing key replaces
/// the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The cached value, stored verbatim
    pub payload: Value,

    /// When the entry was inserted (epoch milliseconds on disk)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Lifetime of the entry (milliseconds on disk)
    #[serde(with = "crate::config::duration_ms")]
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(payload: Value, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            payload,
            created_at,
            ttl,
        }
    }

    /// Instant at which the entry stops being live
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(to_chrono(self.ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Live iff `now - created_at < ttl`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_live(now)
    }

    /// Remaining lifetime, `None` once expired
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at() - now)
            .to_std()
            .ok()
            .filter(|left| !left.is_zero())
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Convert to a chrono duration, saturating at chrono's maximum
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
