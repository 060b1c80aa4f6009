//! Operator commands over a persisted cache file
//!
//! Each command returns the text it prints, so `main` stays a thin dispatcher.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use insight_cache::{
    build_key, fingerprint, CacheConfig, FileSlot, InputDelta, PayloadKind, ResponseCache,
    ReviewRecord, SystemClock,
};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Load the cache configuration
///
/// A config file (YAML or JSON) replaces the defaults; `INSIGHT_CACHE_*`
/// variables override either.
pub fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
    match path {
        None => CacheConfig::from_env().context("Invalid cache configuration in environment"),
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config = CacheConfig::from_yaml_str(&source)
                .with_context(|| format!("Invalid cache config {}", path.display()))?;
            config
                .with_overrides(|name| std::env::var(name).ok())
                .context("Invalid cache configuration in environment")
        }
    }
}

/// Open the cache file for a one-shot command (no background sweeper)
pub fn open_cache(cache_file: &Path, mut config: CacheConfig) -> Result<ResponseCache> {
    config.sweep_interval = Duration::ZERO;
    let slot = Arc::new(FileSlot::new(cache_file));
    let cache = ResponseCache::open(config, slot, Arc::new(SystemClock))
        .with_context(|| format!("Failed to open cache {}", cache_file.display()))?;
    Ok(cache)
}

pub fn fingerprint_report(records: &[ReviewRecord]) -> String {
    format!("{} ({} reviews)", fingerprint(records), records.len())
}

/// Flat cache key the dashboard would use for these reviews
pub fn key_report(tenant: &str, backend: &str, kind: &str, records: &[ReviewRecord]) -> Result<String> {
    let key = build_key(tenant, &fingerprint(records), backend, &PayloadKind::from_tag(kind))?;
    Ok(key.to_storage_string())
}

pub fn delta_report(current: &[ReviewRecord], baseline: &[ReviewRecord]) -> String {
    let delta = InputDelta::compute(current, baseline);
    let mut out = String::new();

    let _ = writeln!(out, "Baseline:  {}", delta.baseline_fingerprint);
    let _ = writeln!(out, "Current:   {}", delta.current_fingerprint);
    let _ = writeln!(out, "New input: {}", if delta.has_new_input() { "yes" } else { "no" });

    if delta.is_revision_only() {
        let _ = writeln!(out, "Existing reviews changed, no new reviews");
    } else if !delta.new_records.is_empty() {
        let _ = writeln!(out, "New reviews ({}):", delta.new_records.len());
        for record in &delta.new_records {
            let _ = writeln!(
                out,
                "  - {} ({:.1}, {})",
                record.id,
                record.rating,
                record.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }
    out
}

/// One line per resident entry, oldest first
pub async fn inspect(cache: &ResponseCache) -> Vec<String> {
    let now = cache.now();
    cache
        .snapshot()
        .await
        .into_iter()
        .map(|(key, entry)| {
            let remaining = entry
                .time_to_live(now)
                .map(format_duration)
                .unwrap_or_else(|| "expired".to_string());
            format!(
                "{}  created {}  expires in {}",
                key,
                format_time(entry.created_at),
                remaining
            )
        })
        .collect()
}

pub async fn stats_report(cache: &ResponseCache) -> String {
    let stats = cache.stats().await;
    let config = cache.config();
    let mut out = String::new();

    let _ = writeln!(out, "Cache Statistics:");
    let _ = writeln!(out, "  Entries:     {}/{}", stats.entries, config.max_entries);
    let _ = writeln!(out, "  Default TTL: {}", format_duration(config.default_ttl));
    let _ = writeln!(out, "  Evictions:   {}", stats.evictions);
    let _ = writeln!(out, "  Expirations: {}", stats.expirations);
    out
}

/// Remove expired entries and persist the result
pub async fn sweep(cache: &ResponseCache) -> usize {
    let event = cache.sweep_expired().await;
    info!("Sweep removed {} entries", event.len());
    event.len()
}

/// Remove all entries, or those whose key contains `pattern`
pub async fn clear(cache: &ResponseCache, pattern: Option<&str>) -> Result<usize> {
    let failures_before = cache.stats().await.persist_failures;
    let removed = cache.clear(pattern).await;
    if cache.stats().await.persist_failures > failures_before {
        anyhow::bail!("Removed {} entries but could not write the cache file", removed);
    }
    Ok(removed)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s >= 86_400 => format!("{}d {}h", s / 86_400, (s % 86_400) / 3600),
        s if s >= 3600 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s if s >= 60 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}s", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 60)), "3h 1m");
        assert_eq!(format_duration(Duration::from_secs(7 * 86_400)), "7d 0h");
    }

    #[test]
    fn test_key_report_escapes_components() {
        let records = vec![ReviewRecord::new("r1", 4.0, Utc::now())];
        let key = key_report("acme:eu", "gpt", "analysis", &records).unwrap();
        assert!(key.starts_with(r"acme\:eu:analysis:gpt:"));

        assert!(key_report("  ", "gpt", "analysis", &records).is_err());
    }
}
