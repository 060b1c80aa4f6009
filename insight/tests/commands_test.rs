//! Operator commands against a real cache file

use chrono::{TimeZone, Utc};
use insight::commands;
use insight::{load_reviews, parse_reviews};
use insight_cache::{
    build_key, fingerprint, CacheConfig, ManualClock, MemorySlot, PayloadKind, ResponseCache,
    ReviewRecord,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn reviews() -> Vec<ReviewRecord> {
    parse_reviews(
        r#"[
            {"id": "r1", "rating": 5, "timestamp": "2024-05-01T10:00:00Z", "text": "Great"},
            {"id": "r2", "rating": 2, "timestamp": "2024-05-02T10:00:00Z"}
        ]"#,
    )
    .unwrap()
}

fn config() -> CacheConfig {
    CacheConfig::builder().max_entries(10).build()
}

#[test]
fn test_load_reviews_from_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("reviews.json");
    std::fs::write(&path, r#"{"reviews": [{"id": "a", "rating": 3.5, "timestamp": "2024-01-01T00:00:00Z"}]}"#).unwrap();

    let loaded = load_reviews(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "a");

    let missing = load_reviews(&tmp.path().join("missing.json")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read reviews"));
}

#[test]
fn test_fingerprint_and_key_agree() {
    let records = reviews();
    let fp = fingerprint(&records);

    assert!(commands::fingerprint_report(&records).starts_with(fp.as_str()));
    assert_eq!(
        commands::key_report("acme", "gpt", "recommendations", &records).unwrap(),
        format!("acme:recommendations:gpt:{}", fp)
    );
}

#[test]
fn test_delta_report() {
    let baseline = reviews();
    let mut current = baseline.clone();
    current.push(ReviewRecord::new("r3", 4.0, Utc.with_ymd_and_hms(2024, 5, 3, 9, 30, 0).unwrap()));

    let report = commands::delta_report(&current, &baseline);
    assert!(report.contains("New input: yes"));
    assert!(report.contains("New reviews (1):"));
    assert!(report.contains("r3 (4.0, 2024-05-03 09:30)"));

    let unchanged = commands::delta_report(&baseline, &baseline);
    assert!(unchanged.contains("New input: no"));
}

#[tokio::test]
async fn test_inspect_sweep_and_clear() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data").join("cache.json");
    let records = reviews();

    let cache = commands::open_cache(&path, config()).unwrap();
    assert!(!cache.has_sweeper());

    let analysis = build_key("acme", &fingerprint(&records), "gpt", &PayloadKind::Analysis).unwrap();
    let recs = build_key("globex", &fingerprint(&records), "gpt", &PayloadKind::Recommendations).unwrap();
    cache.set(analysis.clone(), json!({"summary": "mixed"}), Duration::from_secs(600)).await;
    cache.set(recs.clone(), json!(["reply"]), Duration::from_secs(600)).await;
    cache.dispose().await;

    let reopened = commands::open_cache(&path, config()).unwrap();
    let lines = commands::inspect(&reopened).await;
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|line| line.starts_with(&analysis.to_string())));

    let stats = commands::stats_report(&reopened).await;
    assert!(stats.contains("Entries:     2/10"));

    assert_eq!(commands::sweep(&reopened).await, 0);
    assert_eq!(commands::clear(&reopened, Some("globex")).await.unwrap(), 1);
    drop(reopened);

    let after_clear = commands::open_cache(&path, config()).unwrap();
    assert_eq!(after_clear.keys().await, vec![analysis]);
}

fn memory_cache(slot: Arc<MemorySlot>) -> ResponseCache {
    let config = CacheConfig::builder().max_entries(10).without_sweeper().build();
    ResponseCache::open(config, slot, Arc::new(ManualClock::starting_now())).unwrap()
}

#[tokio::test]
async fn test_clear_writes_once() {
    let slot = Arc::new(MemorySlot::new());
    let cache = memory_cache(slot.clone());
    let records = reviews();

    for tenant in ["acme", "globex"] {
        let key = build_key(tenant, &fingerprint(&records), "gpt", &PayloadKind::Analysis).unwrap();
        cache.set(key, json!({"tenant": tenant}), Duration::from_secs(600)).await;
    }
    assert_eq!(slot.write_count(), 2);

    assert_eq!(commands::clear(&cache, Some("globex")).await.unwrap(), 1);
    assert_eq!(slot.write_count(), 3);
}

#[tokio::test]
async fn test_clear_reports_write_failure() {
    let slot = Arc::new(MemorySlot::with_quota(10));
    let cache = memory_cache(slot.clone());
    let records = reviews();

    for tenant in ["acme", "globex"] {
        let key = build_key(tenant, &fingerprint(&records), "gpt", &PayloadKind::Analysis).unwrap();
        cache.set(key, json!({"tenant": tenant}), Duration::from_secs(600)).await;
    }

    // The surviving entry still does not fit
    let err = commands::clear(&cache, Some("globex")).await.unwrap_err();
    assert!(err.to_string().contains("could not write the cache file"));
    assert_eq!(cache.len().await, 1);
}

#[test]
fn test_load_config_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cache.yaml");
    std::fs::write(&path, "maxEntries: 25\ndefaultTtlMs: 60000\nkindTtlsMs:\n  digest: 1000\n").unwrap();

    let config = commands::load_config(Some(&path)).unwrap();
    assert_eq!(config.max_entries, 25);
    assert_eq!(config.default_ttl, Duration::from_secs(60));
    assert_eq!(config.kind_ttl("digest"), Some(Duration::from_secs(1)));

    std::fs::write(&path, "maxEntries: 0\n").unwrap();
    assert!(commands::load_config(Some(&path)).is_err());
}
