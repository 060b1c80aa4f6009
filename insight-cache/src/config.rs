//! Configuration for the response cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Environment variable overriding [`CacheConfig::default_ttl`]
pub const ENV_DEFAULT_TTL_MS: &str = "INSIGHT_CACHE_DEFAULT_TTL_MS";
/// Environment variable overriding [`CacheConfig::max_entries`]
pub const ENV_MAX_ENTRIES: &str = "INSIGHT_CACHE_MAX_ENTRIES";
/// Environment variable overriding [`CacheConfig::sweep_interval`]
pub const ENV_SWEEP_INTERVAL_MS: &str = "INSIGHT_CACHE_SWEEP_INTERVAL_MS";

/// TTLs are persisted in whole milliseconds
const MIN_TTL: Duration = Duration::from_millis(1);

/// Configuration for the response cache
///
/// Serialized with camelCase names and every duration in milliseconds, so a
/// config file reads `{ "defaultTtlMs": 3600000, "maxEntries": 100, ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Lifetime of entries stored without an explicit TTL
    #[serde(rename = "defaultTtlMs", with = "duration_ms")]
    pub default_ttl: Duration,

    /// Maximum number of resident entries
    pub max_entries: usize,

    /// Period of the background expiry sweep. Zero disables the sweeper.
    #[serde(rename = "sweepIntervalMs", with = "duration_ms")]
    pub sweep_interval: Duration,

    /// Entries that expire within this margin are left out of the persisted blob
    #[serde(rename = "persistMarginMs", with = "duration_ms")]
    pub persist_margin: Duration,

    /// When the storage quota is hit, entries older than this are pruned
    /// before the single retry
    #[serde(rename = "quotaRetentionMs", with = "duration_ms")]
    pub quota_retention: Duration,

    /// Per-kind TTL overrides, keyed by kind tag, in milliseconds
    #[serde(rename = "kindTtlsMs")]
    pub kind_ttls_ms: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 1 hour
            default_ttl: Duration::from_secs(3600),
            max_entries: 100,
            // Sweep every 5 minutes
            sweep_interval: Duration::from_secs(300),
            persist_margin: Duration::from_secs(5),
            // 24 hours
            quota_retention: Duration::from_secs(24 * 3600),
            kind_ttls_ms: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::Config(
                "maxEntries must be greater than 0".to_string(),
            ));
        }

        if self.default_ttl < MIN_TTL {
            return Err(CacheError::Config(
                "defaultTtlMs must be at least 1 ms".to_string(),
            ));
        }

        if let Some((kind, _)) = self.kind_ttls_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(CacheError::Config(format!(
                "kindTtlsMs.{} must be at least 1 ms",
                kind
            )));
        }

        Ok(())
    }

    /// TTL override configured for a kind tag, if any
    pub fn kind_ttl(&self, tag: &str) -> Option<Duration> {
        self.kind_ttls_ms.get(tag).map(|ms| Duration::from_millis(*ms))
    }

    /// Parse a YAML (or JSON) document. Missing fields take their defaults.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(source)
            .map_err(|e| CacheError::Config(format!("invalid cache config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `INSIGHT_CACHE_*` variables, after loading `.env`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DEFAULT_TTL_MS)? {
            self.default_ttl = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<usize>(&lookup, ENV_MAX_ENTRIES)? {
            self.max_entries = max;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_SWEEP_INTERVAL_MS)? {
            self.sweep_interval = Duration::from_millis(ms);
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CacheError::Config(format!("{} is not a valid number: {:?}", name, raw))),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    max_entries: Option<usize>,
    sweep_interval: Option<Duration>,
    persist_margin: Option<Duration>,
    quota_retention: Option<Duration>,
    kind_ttls_ms: BTreeMap<String, u64>,
}

impl CacheConfigBuilder {
    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set maximum number of cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set the expiry sweep interval (zero disables the sweeper)
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disable the background sweeper
    pub fn without_sweeper(self) -> Self {
        self.sweep_interval(Duration::ZERO)
    }

    pub fn persist_margin(mut self, margin: Duration) -> Self {
        self.persist_margin = Some(margin);
        self
    }

    pub fn quota_retention(mut self, retention: Duration) -> Self {
        self.quota_retention = Some(retention);
        self
    }

    /// Override the TTL for one payload kind tag
    ///
    /// Stored in whole milliseconds. A TTL under 1 ms rounds to zero and is
    /// rejected by [`CacheConfig::validate`].
    pub fn kind_ttl(mut self, tag: impl Into<String>, ttl: Duration) -> Self {
        self.kind_ttls_ms.insert(tag.into(), duration_ms::to_millis(ttl));
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            sweep_interval: self.sweep_interval.unwrap_or(defaults.sweep_interval),
            persist_margin: self.persist_margin.unwrap_or(defaults.persist_margin),
            quota_retention: self.quota_retention.unwrap_or(defaults.quota_retention),
            kind_ttls_ms: self.kind_ttls_ms,
        }
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(*value))
    }

    /// Whole milliseconds, saturating at `u64::MAX`
    pub fn to_millis(value: Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
