//! In-memory entry store with count-bounded, oldest-written eviction

use crate::entry::CacheEntry;
use crate::key::CacheKey;
use crate::stats::CacheStats;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of a lookup
#[derive(Debug, PartialEq)]
pub enum Lookup<'a> {
    /// Live entry found
    Hit(&'a CacheEntry),

    /// Key unknown
    Miss,

    /// Key was present but expired; the entry has been deleted
    Expired,
}

impl<'a> Lookup<'a> {
    pub fn entry(self) -> Option<&'a CacheEntry> {
        match self {
            Lookup::Hit(entry) => Some(entry),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

/// Map from key to entry, bounded at `max_entries`
///
/// Eviction picks the entry with the oldest `created_at`. Reads do not refresh
/// an entry's position; only a fresh `insert` does.
#[derive(Debug)]
pub struct EntryStore {
    entries: HashMap<CacheKey, CacheEntry>,
    max_entries: usize,
    stats: CacheStats,
}

impl EntryStore {
    /// `max_entries` is clamped to at least 1
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Look up a key, deleting it if it has expired
    pub fn get(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Lookup<'_> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return Lookup::Miss;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            debug!(key = %key, "Cache entry expired on read");
            self.entries.remove(key);
            self.stats.misses += 1;
            self.stats.expirations += 1;
            return Lookup::Expired;
        }

        self.stats.hits += 1;
        match self.entries.get(key) {
            Some(entry) => Lookup::Hit(entry),
            None => Lookup::Miss,
        }
    }

    /// Whether a live entry exists, without touching statistics
    pub fn contains_live(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false)
    }

    /// Insert or replace an entry, evicting the oldest entries first if a new
    /// key would exceed the bound. Returns the evicted keys.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Vec<CacheKey> {
        let mut evicted = Vec::new();

        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                match self.oldest_key() {
                    Some(oldest) => {
                        debug!(key = %oldest, "Evicting oldest cache entry");
                        self.entries.remove(&oldest);
                        self.stats.evictions += 1;
                        evicted.push(oldest);
                    }
                    None => break,
                }
            }
        }

        self.entries.insert(key, entry);
        evicted
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.stats.invalidations += 1;
        }
        removed
    }

    /// Remove every entry whose `created_at + ttl <= now`
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> Vec<CacheKey> {
        let expired = self.keys_where(|_, entry| entry.is_expired(now));
        for key in &expired {
            self.entries.remove(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired
    }

    /// Remove everything, or only keys whose flat form contains `pattern`
    pub fn clear(&mut self, pattern: Option<&str>) -> Vec<CacheKey> {
        match pattern {
            Some(pattern) => self.remove_where(|key| key.matches(pattern)),
            None => {
                let removed: Vec<CacheKey> = self.entries.drain().map(|(key, _)| key).collect();
                self.stats.invalidations += removed.len() as u64;
                removed
            }
        }
    }

    /// Remove every entry whose key satisfies `predicate`
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let matching = self.keys_where(|key, _| predicate(key));
        for key in &matching {
            self.entries.remove(key);
        }
        self.stats.invalidations += matching.len() as u64;
        matching
    }

    /// Remove entries inserted before `cutoff`
    pub fn prune_created_before(&mut self, cutoff: DateTime<Utc>) -> Vec<CacheKey> {
        let stale = self.keys_where(|_, entry| entry.created_at < cutoff);
        for key in &stale {
            self.entries.remove(key);
        }
        self.stats.invalidations += stale.len() as u64;
        stale
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_persist_failure(&mut self) {
        self.stats.persist_failures += 1;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats.clone()
        }
    }

    /// Oldest `created_at`; ties go to the smallest key so the choice is stable
    fn oldest_key(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone())
    }

    fn keys_where<F>(&self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey, &CacheEntry) -> bool,
    {
        self.entries
            .iter()
            .filter(|(key, entry)| predicate(key, entry))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::ContentFingerprint;
    use crate::key::{build_key, PayloadKind};
    use serde_json::json;
    use std::time::Duration;

    fn key(backend: &str, fp: &str) -> CacheKey {
        build_key("acme", &ContentFingerprint::from_raw(fp), backend, &PayloadKind::Analysis).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn entry(value: i64, created_ms: i64, ttl_ms: u64) -> CacheEntry {
        CacheEntry::new(json!(value), at(created_ms), Duration::from_millis(ttl_ms))
    }

    #[test]
    fn test_basic_insert_and_get() {
        let mut store = EntryStore::new(10);
        store.insert(key("gpt", "a"), entry(1, 0, 1_000));

        let hit = store.get(&key("gpt", "a"), at(10)).entry().cloned();
        assert_eq!(hit.map(|e| e.payload), Some(json!(1)));
        assert_eq!(store.get(&key("gpt", "b"), at(10)), Lookup::Miss);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_lazy_expiry_deletes_entry() {
        let mut store = EntryStore::new(10);
        store.insert(key("gpt", "a"), entry(1, 0, 100));

        assert_eq!(store.get(&key("gpt", "a"), at(100)), Lookup::Expired);
        assert_eq!(store.len(), 0);
        assert_eq!(store.get(&key("gpt", "a"), at(100)), Lookup::Miss);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let mut store = EntryStore::new(1);
        store.insert(key("gpt", "a"), entry(1, 0, 1_000));
        let evicted = store.insert(key("gpt", "a"), entry(2, 50, 1_000));

        assert!(evicted.is_empty());
        assert_eq!(store.len(), 1);
        let current = store.get(&key("gpt", "a"), at(60)).entry().cloned().unwrap();
        assert_eq!(current.payload, json!(2));
        assert_eq!(current.created_at, at(50));
    }

    #[test]
    fn test_eviction_removes_oldest_written() {
        let mut store = EntryStore::new(3);
        store.insert(key("gpt", "b"), entry(2, 200, 10_000));
        store.insert(key("gpt", "a"), entry(1, 100, 10_000));
        store.insert(key("gpt", "c"), entry(3, 300, 10_000));

        // Reading does not refresh recency
        assert!(store.get(&key("gpt", "a"), at(400)).entry().is_some());

        let evicted = store.insert(key("gpt", "d"), entry(4, 400, 10_000));
        assert_eq!(evicted, vec![key("gpt", "a")]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_tie_break_is_deterministic() {
        let mut store = EntryStore::new(2);
        store.insert(key("gpt", "y"), entry(1, 100, 10_000));
        store.insert(key("gpt", "x"), entry(2, 100, 10_000));

        let evicted = store.insert(key("gpt", "z"), entry(3, 200, 10_000));
        assert_eq!(evicted, vec![key("gpt", "x")]);
    }

    #[test]
    fn test_remove_expired() {
        let mut store = EntryStore::new(10);
        store.insert(key("gpt", "a"), entry(1, 0, 100));
        store.insert(key("gpt", "b"), entry(2, 0, 1_000));

        let expired = store.remove_expired(at(500));
        assert_eq!(expired, vec![key("gpt", "a")]);
        assert_eq!(store.len(), 1);
        assert!(store.contains_live(&key("gpt", "b"), at(500)));
    }

    #[test]
    fn test_scoped_clear() {
        let mut store = EntryStore::new(10);
        store.insert(key("backendA", "a"), entry(1, 0, 1_000));
        store.insert(key("backendA", "b"), entry(2, 0, 1_000));
        store.insert(key("backendB", "a"), entry(3, 0, 1_000));

        let removed = store.clear(Some("backendA"));
        assert_eq!(removed.len(), 2);
        assert!(store.contains_live(&key("backendB", "a"), at(10)));

        let removed = store.clear(None);
        assert_eq!(removed.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.stats().invalidations, 3);
    }

    #[test]
    fn test_remove_where_by_component() {
        let mut store = EntryStore::new(10);
        store.insert(key("gpt", "a"), CacheEntry::new(json!(1), at(0), Duration::from_secs(60)));
        store.insert(key("gpt-4", "b"), CacheEntry::new(json!(2), at(0), Duration::from_secs(60)));
        store.insert(key("gpt", "c"), CacheEntry::new(json!(3), at(0), Duration::from_secs(60)));

        let mut removed = store.remove_where(|k| k.backend() == "gpt");
        removed.sort();
        assert_eq!(removed, vec![key("gpt", "a"), key("gpt", "c")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().invalidations, 2);
    }

    #[test]
    fn test_prune_created_before() {
        let mut store = EntryStore::new(10);
        store.insert(key("gpt", "old"), entry(1, 0, 1_000_000));
        store.insert(key("gpt", "new"), entry(2, 5_000, 1_000_000));

        let pruned = store.prune_created_before(at(1_000));
        assert_eq!(pruned, vec![key("gpt", "old")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut store = EntryStore::new(0);
        assert_eq!(store.max_entries(), 1);
        store.insert(key("gpt", "a"), entry(1, 0, 1_000));
        store.insert(key("gpt", "b"), entry(2, 10, 1_000));
        assert_eq!(store.len(), 1);
    }
}
