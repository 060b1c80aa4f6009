//! The response cache service
//!
//! [`ResponseCache`] owns one entry store behind an async mutex, mirrors every
//! mutation to its storage slot and runs the expiry sweeper. Construct one per
//! process with [`ResponseCache::open`], share it by `Arc`, and call
//! [`ResponseCache::dispose`] at shutdown.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::invalidation::{InvalidationEvent, InvalidationReason};
use crate::key::{CacheKey, PayloadKind};
use crate::persistence::{Persistence, SaveOutcome, StorageSlot};
use crate::stats::CacheStats;
use crate::store::{EntryStore, Lookup};
use crate::sweeper::ExpirySweeper;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// State shared between the cache handle and the sweeper task
struct Shared {
    store: Mutex<EntryStore>,
    persistence: Persistence,
    clock: Arc<dyn Clock>,
}

impl Shared {
    async fn sweep(&self) -> InvalidationEvent {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        let expired = store.remove_expired(now);
        if !expired.is_empty() {
            self.persistence.save(&mut store, now);
        }

        InvalidationEvent::new(InvalidationReason::Expired, now, expired)
    }
}

/// Process-local response cache with TTL expiry, bounded size and persistence
pub struct ResponseCache {
    config: CacheConfig,
    shared: Arc<Shared>,
    sweeper: Option<ExpirySweeper>,
}

impl ResponseCache {
    /// Open a cache over `slot`, restoring whatever live entries it holds
    ///
    /// The expiry sweeper is started on the current tokio runtime. Outside a
    /// runtime, or with a zero sweep interval, the cache runs without it and
    /// relies on lazy expiry.
    pub fn open(
        config: CacheConfig,
        slot: Arc<dyn StorageSlot>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let persistence = Persistence::new(slot, config.persist_margin, config.quota_retention);
        let now = clock.now();

        let mut restored = persistence.load(now);
        // Oldest first, so a shrunken bound keeps the newest entries
        restored.sort_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)));
        let restored_count = restored.len();

        let mut store = EntryStore::new(config.max_entries);
        for (key, entry) in restored {
            store.insert(key, entry);
        }

        info!(
            "Opened response cache: {} entries restored, max_entries {}, default_ttl {:?}",
            store.len(),
            config.max_entries,
            config.default_ttl
        );
        if store.len() < restored_count {
            warn!(
                "{} persisted entries dropped to respect max_entries",
                restored_count - store.len()
            );
        }

        let shared = Arc::new(Shared {
            store: Mutex::new(store),
            persistence,
            clock,
        });

        let sweeper = Self::start_sweeper(&config, &shared);

        Ok(Self {
            config,
            shared,
            sweeper,
        })
    }

    /// Default configuration on the system clock
    pub fn with_defaults(slot: Arc<dyn StorageSlot>) -> Result<Self> {
        Self::open(CacheConfig::default(), slot, Arc::new(SystemClock))
    }

    fn start_sweeper(config: &CacheConfig, shared: &Arc<Shared>) -> Option<ExpirySweeper> {
        if config.sweep_interval.is_zero() {
            return None;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime available, expiry sweeper disabled");
            return None;
        }

        let shared = shared.clone();
        Some(ExpirySweeper::start(config.sweep_interval, move || {
            let shared = shared.clone();
            async move { shared.sweep().await.len() }
        }))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the background sweeper is active
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.as_ref().map(|s| s.is_running()).unwrap_or(false)
    }

    /// Lifetime used for a payload kind: configured override, else the kind's built-in TTL
    pub fn ttl_for(&self, kind: &PayloadKind) -> Duration {
        self.config
            .kind_ttl(kind.tag())
            .unwrap_or_else(|| kind.builtin_ttl(self.config.default_ttl))
    }

    /// Get a live payload. Expired entries are deleted and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();

        let payload = match store.get(key, now) {
            Lookup::Hit(entry) => Some(entry.payload.clone()),
            Lookup::Miss => None,
            Lookup::Expired => {
                let event = InvalidationEvent::new(InvalidationReason::Expired, now, vec![key.clone()]);
                debug!("{} entries removed ({})", event.len(), event.reason);
                self.shared.persistence.save(&mut store, now);
                None
            }
        };

        debug!(key = %key, hit = payload.is_some(), "Cache lookup");
        payload
    }

    /// Get and deserialize a payload
    pub async fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.get(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Store a payload, replacing any entry under the same key
    ///
    /// Never fails: at capacity the oldest entry is evicted first, and
    /// persistence problems are logged rather than returned.
    pub async fn set(&self, key: CacheKey, payload: Value, ttl: Duration) {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();

        debug!(key = %key, ttl = ?ttl, "Cache set");
        let evicted = store.insert(key, CacheEntry::new(payload, now, ttl));
        if !evicted.is_empty() {
            let event = InvalidationEvent::new(InvalidationReason::Evicted, now, evicted);
            debug!("{} entries removed ({})", event.len(), event.reason);
        }

        self.shared.persistence.save(&mut store, now);
    }

    /// Serialize and store a payload
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: CacheKey,
        payload: &T,
        ttl: Duration,
    ) -> Result<()> {
        let value = serde_json::to_value(payload)?;
        self.set(key, value, ttl).await;
        Ok(())
    }

    /// Store with the TTL of the key's payload kind
    pub async fn set_for_kind(&self, key: CacheKey, payload: Value) {
        let ttl = self.ttl_for(key.kind());
        self.set(key, payload, ttl).await;
    }

    /// Return the cached value, or compute, store and return it
    ///
    /// `compute` runs without the cache lock held. Its error is returned as-is
    /// and nothing is stored. A cached payload that no longer deserializes as
    /// `T` is treated as a miss.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            match serde_json::from_value::<T>(value) {
                Ok(cached) => return Ok(cached),
                Err(e) => warn!(key = %key, "Cached payload has unexpected shape, recomputing: {}", e),
            }
        }

        let fresh = compute().await?;
        match serde_json::to_value(&fresh) {
            Ok(value) => self.set(key.clone(), value, ttl).await,
            Err(e) => warn!(key = %key, "Computed payload is not serializable, not cached: {}", e),
        }
        Ok(fresh)
    }

    /// Remove all entries, or those whose flat key contains `pattern`
    ///
    /// The pattern is tried both as written and with `:` and `\` escaped the
    /// way the flat key escapes them, so `"acme:"` scopes to a tenant prefix
    /// while `"a:b"` also finds a tenant named `a:b`.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();

        let removed = store.clear(pattern);
        self.shared.persistence.save(&mut store, now);

        let event = InvalidationEvent::new(
            InvalidationReason::Cleared {
                pattern: pattern.map(str::to_string),
            },
            now,
            removed,
        );
        info!("Removed {} entries from cache ({})", event.len(), event.reason);
        event.len()
    }

    /// Remove one entry by key
    pub async fn remove(&self, key: &CacheKey) -> bool {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();

        let removed = store.remove(key).is_some();
        if removed {
            self.shared.persistence.save(&mut store, now);
        }
        removed
    }

    /// Remove every entry whose key satisfies `predicate`, persisting once
    pub async fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();

        let removed = store.remove_where(predicate);
        if !removed.is_empty() {
            self.shared.persistence.save(&mut store, now);
        }
        removed.len()
    }

    /// Remove every expired entry now, persisting if anything was removed
    pub async fn sweep_expired(&self) -> InvalidationEvent {
        self.shared.sweep().await
    }

    /// Persist the current state
    pub async fn save(&self) -> SaveOutcome {
        let mut store = self.shared.store.lock().await;
        let now = self.shared.clock.now();
        self.shared.persistence.save(&mut store, now)
    }

    /// Whether a live entry exists (does not count as a hit or miss)
    pub async fn contains_key(&self, key: &CacheKey) -> bool {
        let store = self.shared.store.lock().await;
        store.contains_live(key, self.shared.clock.now())
    }

    /// Number of resident entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.shared.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.store.lock().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.shared.store.lock().await.stats()
    }

    /// Resident keys, sorted
    pub async fn keys(&self) -> Vec<CacheKey> {
        let store = self.shared.store.lock().await;
        let mut keys: Vec<CacheKey> = store.iter().map(|(key, _)| key.clone()).collect();
        keys.sort();
        keys
    }

    /// Copy of every resident entry, oldest first
    pub async fn snapshot(&self) -> Vec<(CacheKey, CacheEntry)> {
        let store = self.shared.store.lock().await;
        let mut entries: Vec<(CacheKey, CacheEntry)> = store
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|(ka, a), (kb, b)| a.created_at.cmp(&b.created_at).then_with(|| ka.cmp(kb)));
        entries
    }

    /// Current time on the cache clock
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.shared.clock.now()
    }

    /// Stop the sweeper and write a final snapshot
    pub async fn dispose(mut self) -> SaveOutcome {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }

        let outcome = self.save().await;
        info!("Response cache disposed ({:?})", outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hasher::ContentFingerprint;
    use crate::key::build_key;
    use crate::persistence::MemorySlot;
    use serde_json::json;

    fn key(backend: &str, fp: &str, kind: PayloadKind) -> CacheKey {
        build_key("acme", &ContentFingerprint::from_raw(fp), backend, &kind).unwrap()
    }

    fn open(max_entries: usize) -> (ResponseCache, Arc<ManualClock>, Arc<MemorySlot>) {
        let clock = Arc::new(ManualClock::starting_now());
        let slot = Arc::new(MemorySlot::new());
        let config = CacheConfig::builder()
            .max_entries(max_entries)
            .without_sweeper()
            .build();
        let cache = ResponseCache::open(config, slot.clone(), clock.clone()).unwrap();
        (cache, clock, slot)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _, slot) = open(10);
        let k = key("gpt", "a", PayloadKind::Analysis);

        cache.set(k.clone(), json!({"summary": "good"}), Duration::from_secs(60)).await;
        assert_eq!(cache.get(&k).await, Some(json!({"summary": "good"})));
        assert_eq!(slot.write_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_get_deletes_and_persists() {
        let (cache, clock, slot) = open(10);
        let k = key("gpt", "a", PayloadKind::Analysis);

        cache.set(k.clone(), json!(1), Duration::from_secs(60)).await;
        clock.advance(Duration::from_secs(61));

        assert_eq!(cache.get(&k).await, None);
        assert_eq!(cache.len().await, 0);
        assert_eq!(slot.write_count(), 2);
    }

    #[tokio::test]
    async fn test_kind_ttls() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig::builder()
            .default_ttl(Duration::from_secs(600))
            .kind_ttl("digest", Duration::from_secs(5))
            .without_sweeper()
            .build();
        let cache = ResponseCache::open(config, Arc::new(MemorySlot::new()), clock).unwrap();

        assert_eq!(cache.ttl_for(&PayloadKind::Analysis), Duration::from_secs(600));
        assert_eq!(
            cache.ttl_for(&PayloadKind::Recommendations),
            crate::key::RECOMMENDATIONS_TTL
        );
        assert_eq!(
            cache.ttl_for(&PayloadKind::Custom("digest".into())),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_set_for_kind_uses_kind_ttl() {
        let (cache, clock, _) = open(10);
        let analysis = key("gpt", "a", PayloadKind::Analysis);
        let recs = key("gpt", "a", PayloadKind::Recommendations);

        cache.set_for_kind(analysis.clone(), json!("analysis")).await;
        cache.set_for_kind(recs.clone(), json!("recs")).await;

        // Past the one-hour default, inside the week
        clock.advance(Duration::from_secs(2 * 3600));
        assert_eq!(cache.get(&analysis).await, None);
        assert_eq!(cache.get(&recs).await, Some(json!("recs")));
    }

    #[tokio::test]
    async fn test_get_or_compute() {
        let (cache, _, _) = open(10);
        let k = key("gpt", "a", PayloadKind::Analysis);

        let first: std::result::Result<String, String> = cache
            .get_or_compute(&k, Duration::from_secs(60), || async { Ok("computed".to_string()) })
            .await;
        assert_eq!(first.unwrap(), "computed");

        let second: std::result::Result<String, String> = cache
            .get_or_compute(&k, Duration::from_secs(60), || async {
                Err("backend should not be called".to_string())
            })
            .await;
        assert_eq!(second.unwrap(), "computed");
    }

    #[tokio::test]
    async fn test_get_or_compute_error_stores_nothing() {
        let (cache, _, _) = open(10);
        let k = key("gpt", "a", PayloadKind::Analysis);

        let result: std::result::Result<String, String> = cache
            .get_or_compute(&k, Duration::from_secs(60), || async { Err("rate limited".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "rate limited");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_and_clear_write_storage() {
        let (cache, clock, slot) = open(10);
        cache.set(key("gpt", "short", PayloadKind::Analysis), json!(1), Duration::from_secs(10)).await;
        cache.set(key("gpt", "long", PayloadKind::Analysis), json!(2), Duration::from_secs(600)).await;
        assert_eq!(slot.write_count(), 2);

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.sweep_expired().await.len(), 1);
        assert_eq!(slot.write_count(), 3);

        // Nothing expired, nothing written
        assert!(cache.sweep_expired().await.is_empty());
        assert_eq!(slot.write_count(), 3);

        assert_eq!(cache.clear(Some("long")).await, 1);
        assert_eq!(slot.write_count(), 4);
        assert_eq!(slot.contents().as_deref(), Some(r#"{"version":1,"entries":{}}"#));
    }

    #[tokio::test]
    async fn test_clear_finds_delimiter_in_component() {
        let (cache, _, _) = open(10);
        let colon_tenant =
            build_key("a:b", &ContentFingerprint::from_raw("f"), "gpt", &PayloadKind::Analysis).unwrap();
        cache.set(colon_tenant.clone(), json!(1), Duration::from_secs(60)).await;
        cache.set(key("gpt", "x", PayloadKind::Analysis), json!(2), Duration::from_secs(60)).await;

        assert_eq!(cache.clear(Some("a:b")).await, 1);
        assert!(!cache.contains_key(&colon_tenant).await);

        // Raw prefixes still scope by tenant
        assert_eq!(cache.clear(Some("acme:")).await, 1);
    }

    #[tokio::test]
    async fn test_remove_where_writes_once() {
        let (cache, _, slot) = open(10);
        for fp in ["a", "b", "c"] {
            cache.set(key("gpt", fp, PayloadKind::Analysis), json!(fp), Duration::from_secs(60)).await;
        }
        cache.set(key("claude", "a", PayloadKind::Analysis), json!(0), Duration::from_secs(60)).await;
        assert_eq!(slot.write_count(), 4);

        assert_eq!(cache.remove_where(|k| k.backend() == "gpt").await, 3);
        assert_eq!(slot.write_count(), 5);

        assert_eq!(cache.remove_where(|k| k.backend() == "gpt").await, 0);
        assert_eq!(slot.write_count(), 5);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_single_key() {
        let (cache, _, slot) = open(10);
        let k = key("gpt", "abc", PayloadKind::Analysis);
        let longer = key("gpt", "abcd", PayloadKind::Analysis);

        cache.set(k.clone(), json!(1), Duration::from_secs(60)).await;
        cache.set(longer.clone(), json!(2), Duration::from_secs(60)).await;

        assert!(cache.remove(&k).await);
        assert!(!cache.remove(&k).await);
        assert!(cache.contains_key(&longer).await);
        assert_eq!(slot.write_count(), 3);
        assert_eq!(cache.stats().await.invalidations, 1);
    }

    #[tokio::test]
    async fn test_open_respects_shrunken_bound() {
        let clock = Arc::new(ManualClock::starting_now());
        let slot = Arc::new(MemorySlot::new());

        let big = CacheConfig::builder().max_entries(5).without_sweeper().build();
        let cache = ResponseCache::open(big, slot.clone(), clock.clone()).unwrap();
        for fp in ["a", "b", "c", "d"] {
            cache.set(key("gpt", fp, PayloadKind::Analysis), json!(fp), Duration::from_secs(600)).await;
            clock.advance(Duration::from_secs(1));
        }
        cache.dispose().await;

        let small = CacheConfig::builder().max_entries(2).without_sweeper().build();
        let reopened = ResponseCache::open(small, slot, clock).unwrap();
        assert_eq!(
            reopened.keys().await,
            vec![key("gpt", "c", PayloadKind::Analysis), key("gpt", "d", PayloadKind::Analysis)]
        );
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let config = CacheConfig::builder().max_entries(0).build();
        let result = ResponseCache::open(config, Arc::new(MemorySlot::new()), Arc::new(SystemClock));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_outside_runtime_disables_sweeper() {
        let cache = ResponseCache::with_defaults(Arc::new(MemorySlot::new())).unwrap();
        assert!(!cache.has_sweeper());
    }
}
