//! Input records supplied by the review source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fields of a record that take part in fingerprinting and delta detection
///
/// Anything else a record carries (review text, author, ...) is ignored, so two
/// record sets that agree on these three fields are the same input.
pub trait Fingerprintable {
    /// Stable identifier assigned by the review source
    fn record_id(&self) -> &str;

    fn rating(&self) -> f64;

    fn timestamp(&self) -> DateTime<Utc>;
}

/// A customer review as delivered by the review source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub rating: f64,
    /// RFC 3339 / ISO 8601 timestamp
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ReviewRecord {
    pub fn new(id: impl Into<String>, rating: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            rating,
            timestamp,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl Fingerprintable for ReviewRecord {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn rating(&self) -> f64 {
        self.rating
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl<T: Fingerprintable + ?Sized> Fingerprintable for &T {
    fn record_id(&self) -> &str {
        (**self).record_id()
    }

    fn rating(&self) -> f64 {
        (**self).rating()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }
}
