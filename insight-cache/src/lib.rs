//! # Insight Cache (insight-cache)
//!
//! A content-addressed response cache for review analyses.
//!
//! Expensive analyses and recommendations are keyed by tenant, payload kind,
//! producing backend and a fingerprint of the review set they describe. The
//! same reviews in any order produce the same fingerprint, so a repeated
//! request is answered from the cache instead of the backend.
//!
//! ## Features
//!
//! - Order-independent content fingerprints
//! - Structured keys with scoped invalidation
//! - TTL expiry, both lazy and by a background sweeper
//! - Bounded size with oldest-first eviction
//! - Best-effort persistence with quota recovery
//! - Delta detection for incremental re-analysis
//!
//! ## Caching an analysis
//!
//! ```no_run
//! use insight_cache::{AnalysisCache, FileSlot, ResponseCache, ReviewRecord};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let slot = Arc::new(FileSlot::new("./data/insight-cache.json"));
//!     let cache = AnalysisCache::new(Arc::new(ResponseCache::with_defaults(slot)?));
//!
//!     let reviews = vec![ReviewRecord::new("r-1", 4.5, chrono::Utc::now())];
//!
//!     if let Some(summary) = cache.get_analysis::<String, _>("acme", &reviews, "gpt").await? {
//!         println!("Cached: {}", summary);
//!     } else {
//!         cache.cache_analysis("acme", &reviews, "gpt", &"mostly positive").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Detecting new input
//!
//! ```
//! use insight_cache::{delta, ReviewRecord};
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let last = vec![ReviewRecord::new("1", 4.0, now)];
//! let current = vec![ReviewRecord::new("1", 4.0, now), ReviewRecord::new("2", 2.0, now)];
//!
//! assert!(delta::has_new_input(&current, &last));
//! assert_eq!(delta::incremental_input(&current, &last).len(), 1);
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod delta;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod integration;
pub mod invalidation;
pub mod key;
pub mod persistence;
pub mod record;
pub mod stats;
pub mod store;
pub mod sweeper;

// Re-export main types for convenience
pub use cache::ResponseCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use delta::{has_new_input, incremental_input, InputDelta};
pub use entry::CacheEntry;
pub use error::{CacheError, Result, StorageError};
pub use hasher::{fingerprint, ContentFingerprint, NO_DATA};
pub use integration::AnalysisCache;
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use key::{build_key, CacheKey, PayloadKind, RECOMMENDATIONS_TTL};
pub use persistence::{FileSlot, MemorySlot, Persistence, SaveOutcome, StorageSlot};
pub use record::{Fingerprintable, ReviewRecord};
pub use stats::CacheStats;
pub use store::{EntryStore, Lookup};
pub use sweeper::ExpirySweeper;
