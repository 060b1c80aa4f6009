//! Dashboard-facing helpers for the two cached payload kinds
//!
//! Analyses and recommendations are keyed by tenant, the backend that
//! produced them and the fingerprint of the review set they describe.

use crate::cache::ResponseCache;
use crate::error::Result;
use crate::hasher::fingerprint;
use crate::key::{build_key, CacheKey, PayloadKind};
use crate::record::Fingerprintable;
use crate::stats::CacheStats;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Typed access to analyses and recommendations
#[derive(Clone)]
pub struct AnalysisCache {
    cache: Arc<ResponseCache>,
}

impl AnalysisCache {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// Get the underlying cache instance
    pub fn inner(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Key for a payload describing `records`
    pub fn key_for<R: Fingerprintable>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
        kind: PayloadKind,
    ) -> Result<CacheKey> {
        build_key(tenant, &fingerprint(records), backend, &kind)
    }

    pub async fn get_analysis<T, R>(&self, tenant: &str, records: &[R], backend: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        R: Fingerprintable,
    {
        let key = self.key_for(tenant, records, backend, PayloadKind::Analysis)?;
        self.cache.get_as(&key).await
    }

    pub async fn cache_analysis<T, R>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
        analysis: &T,
    ) -> Result<()>
    where
        T: Serialize,
        R: Fingerprintable,
    {
        self.store(tenant, records, backend, PayloadKind::Analysis, analysis)
            .await
    }

    pub async fn get_recommendations<T, R>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        R: Fingerprintable,
    {
        let key = self.key_for(tenant, records, backend, PayloadKind::Recommendations)?;
        self.cache.get_as(&key).await
    }

    pub async fn cache_recommendations<T, R>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
        recommendations: &T,
    ) -> Result<()>
    where
        T: Serialize,
        R: Fingerprintable,
    {
        self.store(tenant, records, backend, PayloadKind::Recommendations, recommendations)
            .await
    }

    /// Cached analysis for `records`, or the result of `analyze` (stored on success)
    ///
    /// Backend errors pass through unchanged; a key error is converted with `From`.
    pub async fn analysis_or_else<T, R, E, F, Fut>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
        analyze: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        R: Fingerprintable,
        E: From<crate::error::CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = self.key_for(tenant, records, backend, PayloadKind::Analysis)?;
        let ttl = self.cache.ttl_for(&PayloadKind::Analysis);
        self.cache.get_or_compute(&key, ttl, analyze).await
    }

    /// Drop every cached payload produced by one backend
    pub async fn invalidate_backend(&self, backend: &str) -> usize {
        self.invalidate_component(backend, |key| key.backend() == backend)
            .await
    }

    /// Drop every cached payload belonging to one tenant
    pub async fn invalidate_tenant(&self, tenant: &str) -> usize {
        self.invalidate_component(tenant, |key| key.tenant() == tenant)
            .await
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn store<T: Serialize, R: Fingerprintable>(
        &self,
        tenant: &str,
        records: &[R],
        backend: &str,
        kind: PayloadKind,
        payload: &T,
    ) -> Result<()> {
        let ttl = self.cache.ttl_for(&kind);
        let key = self.key_for(tenant, records, backend, kind)?;
        self.cache.set_as(key, payload, ttl).await
    }

    /// Remove keys by exact component match. A substring `clear` would also
    /// catch "gpt-4" when invalidating "gpt".
    async fn invalidate_component<F>(&self, component: &str, belongs: F) -> usize
    where
        F: Fn(&CacheKey) -> bool,
    {
        let removed = self.cache.remove_where(belongs).await;
        info!("Invalidated {} cached payloads for '{}'", removed, component);
        removed
    }
}
