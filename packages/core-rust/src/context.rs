//! Request-scoped correlation context.
//!
//! A [`CorrelationContext`] is an owned, mutable map built by whoever starts
//! a logical request. Freezing it with [`CorrelationContext::snapshot`]
//! yields a [`CorrelationSnapshot`], the only thing that can be installed as
//! the *ambient* context of a task. Installation is always scoped: the
//! snapshot is visible for exactly the duration of the future (or closure)
//! handed to [`CorrelationSnapshot::scope`] / [`CorrelationSnapshot::sync_scope`],
//! and the slot reverts when that scope ends, whether the work completed,
//! failed, panicked, or was dropped mid-flight.
//!
//! Child work never mutates the parent's view: a child reads its own copy via
//! [`CorrelationContext::current`], changes it, and installs a new snapshot
//! for its own descendants.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Canonical context key for the request correlation identifier.
pub const REQUEST_ID_KEY: &str = "requestId";

/// Context key for the session identifier forwarded on outbound calls.
pub const SESSION_ID_KEY: &str = "sessionId";

tokio::task_local! {
    static AMBIENT: CorrelationSnapshot;
}

// ---------------------------------------------------------------------------
// CorrelationContext
// ---------------------------------------------------------------------------

/// Mutable key/value correlation metadata owned by one logical unit of control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationContext {
    entries: BTreeMap<String, String>,
}

impl CorrelationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context holding only the given request id.
    #[must_use]
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        let mut ctx = Self::new();
        ctx.set(REQUEST_ID_KEY, request_id);
        ctx
    }

    /// Returns a private copy of the ambient context of the calling task.
    ///
    /// Outside any scope this is an empty context.
    #[must_use]
    pub fn current() -> Self {
        CorrelationSnapshot::current().to_context()
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Shorthand for `get(REQUEST_ID_KEY)`.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_KEY)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Freezes the current entries into an immutable snapshot.
    ///
    /// The snapshot shares nothing mutable with `self`; later `set` calls on
    /// this context are not observed by it.
    #[must_use]
    pub fn snapshot(&self) -> CorrelationSnapshot {
        CorrelationSnapshot {
            entries: Arc::new(self.entries.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// CorrelationSnapshot
// ---------------------------------------------------------------------------

/// Immutable point-in-time copy of a [`CorrelationContext`].
///
/// Cloning is an `Arc` bump, so a snapshot can be handed to any number of
/// workers without further synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationSnapshot {
    entries: Arc<BTreeMap<String, String>>,
}

impl CorrelationSnapshot {
    /// The empty snapshot. Installing it masks any outer ambient context.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the snapshot installed for the calling task, or the empty
    /// snapshot when no scope is active.
    #[must_use]
    pub fn current() -> Self {
        AMBIENT.try_with(Clone::clone).unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_KEY)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the snapshot into a fresh mutable context (copy-on-fork).
    #[must_use]
    pub fn to_context(&self) -> CorrelationContext {
        CorrelationContext {
            entries: (*self.entries).clone(),
        }
    }

    /// Runs `fut` with this snapshot installed as the ambient context.
    ///
    /// Whatever was ambient before is fully replaced (never merged) for the
    /// duration of the future and is restored once it finishes or is dropped.
    pub fn scope<F>(self, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        AMBIENT.scope(self, fut)
    }

    /// Synchronous counterpart of [`scope`](Self::scope) for blocking closures.
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        AMBIENT.sync_scope(self, f)
    }
}

impl From<CorrelationContext> for CorrelationSnapshot {
    fn from(ctx: CorrelationContext) -> Self {
        Self {
            entries: Arc::new(ctx.entries),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
