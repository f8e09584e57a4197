//! Opaque correlation identifiers.

use std::fmt;

use uuid::Uuid;

/// Length of the compact identifier used when an outbound call has no
/// enclosing request context.
const COMPACT_LEN: usize = 10;

/// Opaque token tying together log entries for one logical request.
///
/// Components only ever check presence or absence; the content is never
/// interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh identifier (hyphenated UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generates a short 10-character hex identifier.
    ///
    /// Used for calls issued outside any request (background jobs), where a
    /// full UUID would only add noise to downstream logs.
    #[must_use]
    pub fn generate_compact() -> Self {
        let mut raw = Uuid::new_v4().simple().to_string();
        raw.truncate(COMPACT_LEN);
        Self(raw)
    }

    /// Accepts a caller-supplied identifier verbatim.
    ///
    /// Returns `None` for empty or whitespace-only input so the caller can
    /// fall back to [`CorrelationId::generate`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}
