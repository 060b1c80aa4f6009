//! Hierarchical cache keys
//!
//! A key is kept as a structured record and only flattened to a string at the
//! persistence boundary. The flat form is `tenant:kind:backend:fingerprint`
//! with `\` written as `\\` and `:` written as `\:` inside every component,
//! so distinct keys always flatten to distinct strings.

use crate::error::{CacheError, Result};
use crate::hasher::ContentFingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const DELIMITER: char = ':';
const ESCAPE: char = '\\';

/// Week-long lifetime for recommendation payloads
pub const RECOMMENDATIONS_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Kind of payload stored under a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayloadKind {
    /// AI analysis of a review set. Short-lived.
    Analysis,

    /// Recommendations derived from a review set. Kept for a week.
    Recommendations,

    /// Any other payload, identified by its tag
    Custom(String),
}

impl PayloadKind {
    /// Tag used inside the flat key
    pub fn tag(&self) -> &str {
        match self {
            PayloadKind::Analysis => "analysis",
            PayloadKind::Recommendations => "recommendations",
            PayloadKind::Custom(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "analysis" => PayloadKind::Analysis,
            "recommendations" => PayloadKind::Recommendations,
            other => PayloadKind::Custom(other.to_string()),
        }
    }

    /// Built-in lifetime for this kind, before configuration overrides
    pub fn builtin_ttl(&self, default_ttl: Duration) -> Duration {
        match self {
            PayloadKind::Recommendations => RECOMMENDATIONS_TTL,
            PayloadKind::Analysis | PayloadKind::Custom(_) => default_ttl,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Structured cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    tenant: String,
    kind: PayloadKind,
    backend: String,
    fingerprint: ContentFingerprint,
}

impl CacheKey {
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn kind(&self) -> &PayloadKind {
        &self.kind
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn fingerprint(&self) -> &ContentFingerprint {
        &self.fingerprint
    }

    /// Flat, escaped form used in the persisted blob
    pub fn to_storage_string(&self) -> String {
        let mut out = String::new();
        for (i, component) in self.components().iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            escape_into(&mut out, component);
        }
        out
    }

    /// Parse a flat key produced by [`CacheKey::to_storage_string`]
    pub fn parse(flat: &str) -> Result<Self> {
        let mut components: Vec<String> = vec![String::new()];
        let mut chars = flat.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped @ (ESCAPE | DELIMITER)) => {
                        if let Some(last) = components.last_mut() {
                            last.push(escaped);
                        }
                    }
                    _ => {
                        return Err(CacheError::InvalidKey(format!(
                            "dangling escape in {:?}",
                            flat
                        )))
                    }
                },
                DELIMITER => components.push(String::new()),
                other => {
                    if let Some(last) = components.last_mut() {
                        last.push(other);
                    }
                }
            }
        }

        match <[String; 4]>::try_from(components) {
            Ok([tenant, kind, backend, fingerprint]) => build_key(
                &tenant,
                &ContentFingerprint::from_raw(fingerprint),
                &backend,
                &PayloadKind::from_tag(&kind),
            ),
            Err(parts) => Err(CacheError::InvalidKey(format!(
                "expected 4 components, found {} in {:?}",
                parts.len(),
                flat
            ))),
        }
    }

    /// Substring match against the flat form, used for scoped invalidation
    ///
    /// The pattern matches as written, so `"acme:"` still selects a tenant
    /// prefix, and also with its delimiters escaped, so a pattern naming a
    /// component that contains `:` finds that component.
    pub fn matches(&self, pattern: &str) -> bool {
        let flat = self.to_storage_string();
        if flat.contains(pattern) {
            return true;
        }

        let mut escaped = String::with_capacity(pattern.len());
        escape_into(&mut escaped, pattern);
        escaped != pattern && flat.contains(&escaped)
    }

    fn components(&self) -> [&str; 4] {
        [
            &self.tenant,
            self.kind.tag(),
            &self.backend,
            self.fingerprint.as_str(),
        ]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_string())
    }
}

/// Compose a key from its four components
///
/// Components are trimmed; an empty component is rejected. Delimiters inside
/// components are escaped, not rejected.
pub fn build_key(
    tenant: &str,
    fingerprint: &ContentFingerprint,
    backend: &str,
    kind: &PayloadKind,
) -> Result<CacheKey> {
    let tenant = non_empty("tenant", tenant)?;
    let backend = non_empty("backend", backend)?;
    non_empty("kind", kind.tag())?;
    non_empty("fingerprint", fingerprint.as_str())?;

    let kind = match kind {
        PayloadKind::Custom(tag) => PayloadKind::from_tag(tag.trim()),
        other => other.clone(),
    };

    Ok(CacheKey {
        tenant,
        kind,
        backend,
        fingerprint: fingerprint.clone(),
    })
}

fn non_empty(name: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CacheError::InvalidKey(format!("{} must not be empty", name)));
    }
    Ok(trimmed.to_string())
}

fn escape_into(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == ESCAPE || c == DELIMITER {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}
