//! Error types for cache operations
//!
//! Lookups and inserts never fail: a miss is `None`, not an error. The types
//! here cover the fallible edges of the crate (configuration, key building,
//! typed payload conversion and the durable storage slot).

use thiserror::Error;

/// Errors raised by a [`StorageSlot`](crate::persistence::StorageSlot)
#[derive(Error, Debug)]
pub enum StorageError {
    /// The slot cannot hold a blob of this size
    #[error("Storage quota exceeded: {needed} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { needed: usize, limit: usize },

    /// The device backing the slot has no space left
    #[error("Storage device is full")]
    StorageFull,

    /// Underlying filesystem error
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the failure is recoverable by shrinking the persisted blob
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            StorageError::QuotaExceeded { .. } | StorageError::StorageFull
        )
    }
}

/// Main error type for the cache subsystem
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A key component was empty or a stored key could not be parsed
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Payload could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted blob was written by an incompatible version
    #[error("Unsupported persisted format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
