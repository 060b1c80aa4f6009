//! Why entries leave the cache
//!
//! Expiry (lazy or swept), capacity eviction, `clear` and the storage quota
//! prune each build an [`InvalidationEvent`] and log it where it happens.
//! Removal by key or predicate reports a count instead.

use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use std::fmt;

/// Reason for removing entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationReason {
    /// TTL ran out
    Expired,

    /// Oldest entry evicted to stay within `max_entries`
    Evicted,

    /// Removed by `clear`, optionally scoped to a key substring
    Cleared { pattern: Option<String> },

    /// Old entries pruned after the storage quota was hit
    QuotaPrune,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::Evicted => write!(f, "capacity eviction"),
            InvalidationReason::Cleared { pattern: None } => write!(f, "cleared"),
            InvalidationReason::Cleared {
                pattern: Some(pattern),
            } => write!(f, "cleared matching {:?}", pattern),
            InvalidationReason::QuotaPrune => write!(f, "storage quota prune"),
        }
    }
}

/// A batch of keys removed for one reason
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,

    /// When the removal happened (cache clock)
    pub timestamp: DateTime<Utc>,

    pub keys: Vec<CacheKey>,
}

impl InvalidationEvent {
    pub fn new(reason: InvalidationReason, timestamp: DateTime<Utc>, keys: Vec<CacheKey>) -> Self {
        Self {
            reason,
            timestamp,
            keys,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
