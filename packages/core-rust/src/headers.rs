//! Correlation header names and the rules for reading and stamping them.
//!
//! These are pure functions over [`http::HeaderMap`] so the inbound layer and
//! the outbound client interceptor share one definition of the behavior.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::context::CorrelationSnapshot;
use crate::id::CorrelationId;

/// Request correlation header, read inbound and stamped outbound.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Session header stamped on outbound calls; defaults to the request id.
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Response header identifying the host that served the request.
pub const HOST_ID_HEADER: HeaderName = HeaderName::from_static("x-host-id");

/// Reads the correlation id from `name`, generating a new one when the header
/// is missing, blank, or not valid visible ASCII.
#[must_use]
pub fn extract_correlation_id(headers: &HeaderMap, name: &HeaderName) -> CorrelationId {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(CorrelationId::parse)
        .unwrap_or_else(CorrelationId::generate)
}

/// Where the outbound request id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// The caller set the header explicitly; it was left untouched.
    Explicit,
    /// Taken from the ambient correlation context.
    Ambient,
    /// Freshly generated because there was no enclosing request.
    Generated,
}

/// Result of [`stamp_outbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampOutcome {
    /// Request id the outgoing call now carries.
    pub request_id: HeaderValue,
    pub source: IdSource,
    /// Whether the session header was filled in from the request id.
    pub session_defaulted: bool,
}

/// Stamps correlation headers onto an outgoing request.
///
/// An explicit `X-Request-ID` always wins. Otherwise the ambient request id is
/// used, and failing that a compact id is generated. `X-Session-ID` defaults to
/// the resulting request id when absent. Existing values are never overwritten,
/// so stamping twice is a no-op.
pub fn stamp_outbound(headers: &mut HeaderMap, ambient: &CorrelationSnapshot) -> StampOutcome {
    let (request_id, source) = if let Some(existing) = headers.get(REQUEST_ID_HEADER) {
        (existing.clone(), IdSource::Explicit)
    } else {
        let (value, source) = ambient
            .request_id()
            .and_then(|id| HeaderValue::from_str(id).ok())
            .map_or_else(|| (generated_value(), IdSource::Generated), |v| (v, IdSource::Ambient));
        headers.insert(REQUEST_ID_HEADER, value.clone());
        (value, source)
    };

    let session_defaulted = !headers.contains_key(SESSION_ID_HEADER);
    if session_defaulted {
        headers.insert(SESSION_ID_HEADER, request_id.clone());
    }

    StampOutcome {
        request_id,
        source,
        session_defaulted,
    }
}

fn generated_value() -> HeaderValue {
    // Hex digits only, always a valid header value.
    HeaderValue::from_str(CorrelationId::generate_compact().as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
