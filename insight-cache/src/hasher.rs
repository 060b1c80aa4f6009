//! Content fingerprints for review record sets
//!
//! A fingerprint summarizes the identity of a record set: each record is
//! reduced to `(id, rating, timestamp)`, the set is put into a canonical order
//! and the resulting string goes through a 32-bit polynomial rolling hash,
//! rendered in base 36.
//!
//! The hash is chosen for speed. It is not collision-free; a collision serves
//! a cached answer computed for a different record set of the same shape.

use crate::record::Fingerprintable;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Marker for "no data has been analyzed yet"
///
/// Contains `-`, which is not a base-36 digit, so no record set (including
/// the empty one) ever fingerprints to it.
pub const NO_DATA: &str = "no-data";

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// Short fingerprint of a record set's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// The "nothing analyzed yet" fingerprint
    pub fn no_data() -> Self {
        Self(NO_DATA.to_string())
    }

    /// Wrap an already computed fingerprint (e.g. one read back from storage)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_no_data(&self) -> bool {
        self.0 == NO_DATA
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint a record set. Input order does not matter.
pub fn fingerprint<R: Fingerprintable>(records: &[R]) -> ContentFingerprint {
    let canonical = canonical_form(records);
    // Reinterpret the signed hash so distinct hashes stay distinct
    ContentFingerprint(to_base36(rolling_hash(&canonical) as u32))
}

/// Order-independent serialization of a record set
///
/// Records are sorted by id, then timestamp, then rating, so even sets with
/// repeated ids have a single canonical form. The record count leads the
/// string, which keeps the empty set from hashing to zero.
pub fn canonical_form<R: Fingerprintable>(records: &[R]) -> String {
    let mut sorted: Vec<&R> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.record_id()
            .cmp(b.record_id())
            .then_with(|| a.timestamp().cmp(&b.timestamp()))
            .then_with(|| a.rating().total_cmp(&b.rating()))
    });

    let mut out = format!("n={}", sorted.len());
    for record in sorted {
        out.push(RECORD_SEPARATOR);
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "{}{sep}{}{sep}{}",
            record.record_id(),
            record.rating(),
            record.timestamp().timestamp_millis(),
            sep = FIELD_SEPARATOR,
        );
    }
    out
}

/// 32-bit polynomial rolling hash (`h = h * 31 + unit`) over UTF-16 code units
pub fn rolling_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Render a value in lowercase base 36
pub fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(7);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}
