//! Detecting new input since the last analysis
//!
//! Change detection compares fingerprints, so any difference in id, rating or
//! timestamp counts. The incremental subset is computed by identifier only: a
//! record whose id was already analyzed is never part of it, even if its
//! rating or timestamp has changed since.

use crate::hasher::{fingerprint, ContentFingerprint};
use crate::record::Fingerprintable;
use std::collections::HashSet;

/// True iff the two record sets fingerprint differently
pub fn has_new_input<R: Fingerprintable>(current: &[R], last_analyzed: &[R]) -> bool {
    fingerprint(current) != fingerprint(last_analyzed)
}

/// Records of `current` whose id does not occur in `last_analyzed`, in `current` order
pub fn incremental_input<'a, R: Fingerprintable>(current: &'a [R], last_analyzed: &[R]) -> Vec<&'a R> {
    let seen: HashSet<&str> = last_analyzed.iter().map(|r| r.record_id()).collect();
    current
        .iter()
        .filter(|record| !seen.contains(record.record_id()))
        .collect()
}

/// Comparison of a current record set against the last analyzed one
#[derive(Debug)]
pub struct InputDelta<'a, R> {
    pub current_fingerprint: ContentFingerprint,
    pub baseline_fingerprint: ContentFingerprint,
    /// Records whose id is new since the baseline
    pub new_records: Vec<&'a R>,
}

impl<'a, R: Fingerprintable> InputDelta<'a, R> {
    pub fn compute(current: &'a [R], last_analyzed: &[R]) -> Self {
        Self {
            current_fingerprint: fingerprint(current),
            baseline_fingerprint: fingerprint(last_analyzed),
            new_records: incremental_input(current, last_analyzed),
        }
    }

    /// Against a baseline that was never analyzed, every record is new
    pub fn from_scratch(current: &'a [R]) -> Self {
        Self {
            current_fingerprint: fingerprint(current),
            baseline_fingerprint: ContentFingerprint::no_data(),
            new_records: current.iter().collect(),
        }
    }

    pub fn has_new_input(&self) -> bool {
        self.current_fingerprint != self.baseline_fingerprint
    }

    /// Content changed but no new ids appeared (edits or removals only)
    pub fn is_revision_only(&self) -> bool {
        self.has_new_input() && self.new_records.is_empty()
    }
}
