//! Demonstrates the cached analysis flow
//!
//! This example shows how to:
//! - Open a cache backed by a JSON file
//! - Serve a repeated analysis request from the cache
//! - Detect the new reviews since the last analysis

use chrono::Utc;
use insight_cache::{AnalysisCache, CacheConfig, FileSlot, InputDelta, ResponseCache, ReviewRecord, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct Analysis {
    reviews: usize,
    average_rating: f64,
}

async fn analyze(records: &[ReviewRecord]) -> anyhow::Result<Analysis> {
    // Stand-in for the language model call
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let total: f64 = records.iter().map(|r| r.rating).sum();
    Ok(Analysis {
        reviews: records.len(),
        average_rating: total / records.len().max(1) as f64,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let path = std::env::temp_dir().join("insight-cache-demo.json");
    println!("Using cache file {}\n", path.display());

    let config = CacheConfig::from_env()?;
    let cache = Arc::new(ResponseCache::open(
        config,
        Arc::new(FileSlot::new(&path)),
        Arc::new(SystemClock),
    )?);
    let analyses = AnalysisCache::new(cache.clone());

    let now = Utc::now();
    let first_batch = vec![
        ReviewRecord::new("r-1", 5.0, now).with_text("Fast delivery"),
        ReviewRecord::new("r-2", 2.0, now).with_text("Cold food"),
    ];

    // 1. First request goes to the backend
    println!("1. Analyzing {} reviews...", first_batch.len());
    let analysis: Analysis = analyses
        .analysis_or_else("demo", &first_batch, "local", || analyze(&first_batch))
        .await?;
    println!("   {:?}", analysis);

    // 2. Same reviews in another order are served from the cache
    let reordered: Vec<ReviewRecord> = first_batch.iter().rev().cloned().collect();
    let cached: Option<Analysis> = analyses.get_analysis("demo", &reordered, "local").await?;
    println!("2. Reordered request cached: {}", cached.is_some());

    // 3. A new review arrives
    let mut second_batch = first_batch.clone();
    second_batch.push(ReviewRecord::new("r-3", 4.0, Utc::now()));
    let delta = InputDelta::compute(&second_batch, &first_batch);
    println!(
        "3. New input: {} ({} new reviews, fingerprint {} -> {})",
        delta.has_new_input(),
        delta.new_records.len(),
        delta.baseline_fingerprint,
        delta.current_fingerprint
    );

    println!("\n{}", analyses.stats().await);

    drop(analyses);
    match Arc::try_unwrap(cache) {
        Ok(cache) => {
            cache.dispose().await;
        }
        Err(_) => println!("Cache still shared, skipping final save"),
    }

    Ok(())
}
