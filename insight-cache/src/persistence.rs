//! Best-effort mirroring of the entry store to a durable slot
//!
//! The whole store is written as one versioned JSON blob:
//!
//! ```json
//! {"version":1,"entries":{"acme:analysis:gpt:1x9k2":{"payload":{},"createdAt":1714557600000,"ttl":3600000}}}
//! ```
//!
//! Persistence is an optimization. Failures are logged and counted, never
//! returned to the caller of a cache operation.

use crate::entry::{to_chrono, CacheEntry};
use crate::error::{CacheError, Result, StorageError};
use crate::invalidation::{InvalidationEvent, InvalidationReason};
use crate::key::CacheKey;
use crate::store::EntryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Version written into every persisted blob
pub const FORMAT_VERSION: u32 = 1;

// ENOSPC on Linux and macOS
const ENOSPC: i32 = 28;

/// A durable key-value slot holding one blob
///
/// Implementations must make `write` replace the previous blob as a whole.
pub trait StorageSlot: Send + Sync {
    /// Read the blob, `None` if nothing was ever written
    fn read(&self) -> std::result::Result<Option<String>, StorageError>;

    fn write(&self, blob: &str) -> std::result::Result<(), StorageError>;

    fn remove(&self) -> std::result::Result<(), StorageError>;
}

/// JSON file on disk
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota_bytes: None,
        }
    }

    /// Refuse blobs larger than `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StorageSlot for FileSlot {
    fn read(&self) -> std::result::Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, blob: &str) -> std::result::Result<(), StorageError> {
        check_quota(self.quota_bytes, blob)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(classify_io)?;
        }

        let temp = self.temp_path();
        fs::write(&temp, blob).map_err(classify_io)?;
        fs::rename(&temp, &self.path).map_err(classify_io)?;
        Ok(())
    }

    fn remove(&self) -> std::result::Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process slot, for tests and hosts without a filesystem
#[derive(Debug, Default)]
pub struct MemorySlot {
    blob: Mutex<Option<String>>,
    quota_bytes: Option<usize>,
    writes: AtomicUsize,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse blobs larger than `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::default()
        }
    }

    /// Current blob, if any
    pub fn contents(&self) -> Option<String> {
        self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the blob directly, bypassing the quota
    pub fn set_contents(&self, blob: impl Into<String>) {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(blob.into());
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StorageSlot for MemorySlot {
    fn read(&self) -> std::result::Result<Option<String>, StorageError> {
        Ok(self.contents())
    }

    fn write(&self, blob: &str) -> std::result::Result<(), StorageError> {
        check_quota(self.quota_bytes, blob)?;
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(blob.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> std::result::Result<(), StorageError> {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

fn check_quota(quota: Option<usize>, blob: &str) -> std::result::Result<(), StorageError> {
    match quota {
        Some(limit) if blob.len() > limit => Err(StorageError::QuotaExceeded {
            needed: blob.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

fn classify_io(e: io::Error) -> StorageError {
    if e.raw_os_error() == Some(ENOSPC) {
        StorageError::StorageFull
    } else {
        StorageError::Io(e)
    }
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl PersistedState {
    /// Parse a blob, rejecting anything that is not the current version
    pub fn decode(blob: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(blob)?;
        let found = value.get("version").and_then(Value::as_u64).unwrap_or(0);

        if found != u64::from(FORMAT_VERSION) {
            return Err(CacheError::UnsupportedVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: FORMAT_VERSION,
            });
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// What a `save` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Blob written with this many entries
    Saved { persisted: usize },

    /// First write hit the quota; old entries were pruned and the retry succeeded
    Recovered { persisted: usize, pruned: usize },

    /// Nothing was written
    Failed,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        !matches!(self, SaveOutcome::Failed)
    }
}

/// Persistence adapter between an [`EntryStore`] and a [`StorageSlot`]
pub struct Persistence {
    slot: Arc<dyn StorageSlot>,
    margin: Duration,
    retention: Duration,
}

impl Persistence {
    /// `margin`: entries expiring sooner than this are not written.
    /// `retention`: age beyond which entries are pruned on quota failure.
    pub fn new(slot: Arc<dyn StorageSlot>, margin: Duration, retention: Duration) -> Self {
        Self {
            slot,
            margin,
            retention,
        }
    }

    /// Write a snapshot of the store
    ///
    /// On a quota failure, entries older than the retention window are
    /// removed from the store and the write is retried once.
    pub fn save(&self, store: &mut EntryStore, now: DateTime<Utc>) -> SaveOutcome {
        let error = match self.write_snapshot(store, now) {
            Ok(persisted) => return SaveOutcome::Saved { persisted },
            Err(e) => e,
        };

        if !is_quota_error(&error) {
            error!(
                operation = "save",
                entries = store.len(),
                "Failed to persist cache: {}",
                error
            );
            store.record_persist_failure();
            return SaveOutcome::Failed;
        }

        let event = self.prune_for_quota(store, now);
        let pruned = event.len();
        warn!(
            operation = "save",
            entries = store.len(),
            pruned,
            "Storage quota exceeded, {} entries removed ({}), retrying",
            pruned,
            event.reason
        );

        match self.write_snapshot(store, now) {
            Ok(persisted) => SaveOutcome::Recovered { persisted, pruned },
            Err(e) => {
                error!(
                    operation = "save",
                    entries = store.len(),
                    "Failed to persist cache after pruning: {}",
                    e
                );
                store.record_persist_failure();
                SaveOutcome::Failed
            }
        }
    }

    /// Read back persisted entries that are still live at `now`
    ///
    /// A missing, unreadable, corrupted or wrong-version blob yields no
    /// entries. Entries whose key cannot be parsed are skipped.
    pub fn load(&self, now: DateTime<Utc>) -> Vec<(CacheKey, CacheEntry)> {
        let blob = match self.slot.read() {
            Ok(Some(blob)) => blob,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(operation = "load", "Failed to read persisted cache, starting empty: {}", e);
                return Vec::new();
            }
        };

        let state = match PersistedState::decode(&blob) {
            Ok(state) => state,
            Err(e) => {
                warn!(operation = "load", "Persisted cache discarded, starting empty: {}", e);
                return Vec::new();
            }
        };

        let total = state.entries.len();
        let mut loaded = Vec::with_capacity(total);
        for (flat, entry) in state.entries {
            if !entry.is_live(now) {
                continue;
            }
            match CacheKey::parse(&flat) {
                Ok(key) => loaded.push((key, entry)),
                Err(e) => warn!(operation = "load", "Skipping persisted entry: {}", e),
            }
        }

        debug!(
            operation = "load",
            persisted = total,
            live = loaded.len(),
            "Loaded persisted cache"
        );
        loaded
    }

    /// Drop entries created before the retention window
    pub(crate) fn prune_for_quota(
        &self,
        store: &mut EntryStore,
        now: DateTime<Utc>,
    ) -> InvalidationEvent {
        let cutoff = now
            .checked_sub_signed(to_chrono(self.retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        InvalidationEvent::new(
            InvalidationReason::QuotaPrune,
            now,
            store.prune_created_before(cutoff),
        )
    }

    /// Serialize entries that outlive the safety margin and write them
    fn write_snapshot(&self, store: &EntryStore, now: DateTime<Utc>) -> Result<usize> {
        let horizon = now
            .checked_add_signed(to_chrono(self.margin))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entries: BTreeMap<String, CacheEntry> = store
            .iter()
            .filter(|(_, entry)| entry.expires_at() > horizon)
            .map(|(key, entry)| (key.to_storage_string(), entry.clone()))
            .collect();
        let persisted = entries.len();

        let blob = serde_json::to_string(&PersistedState {
            version: FORMAT_VERSION,
            entries,
        })?;
        self.slot.write(&blob)?;

        debug!(operation = "save", persisted, bytes = blob.len(), "Persisted cache");
        Ok(persisted)
    }
}

fn is_quota_error(error: &CacheError) -> bool {
    matches!(error, CacheError::Storage(e) if e.is_quota_exceeded())
}
