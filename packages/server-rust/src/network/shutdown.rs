//! Server lifecycle state shared by the network module and health probes.
//!
//! Uses `ArcSwap` for lock-free health state transitions.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Server health state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Listener bound, not yet serving.
    Starting,
    /// Serving requests.
    Ready,
    /// Shutdown signalled; in-flight requests and executor tasks are draining.
    Draining,
    /// HTTP server and executor have both stopped.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Whether new requests should be routed to this server.
    #[must_use]
    pub fn is_accepting(self) -> bool {
        self == Self::Ready
    }
}

/// Tracks the server's [`HealthState`].
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<ArcSwap<HealthState>>,
}

impl Lifecycle {
    /// Creates a lifecycle in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    pub fn set_draining(&self) {
        self.state.store(Arc::new(HealthState::Draining));
    }

    pub fn set_stopped(&self) {
        self.state.store(Arc::new(HealthState::Stopped));
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_starting_state() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.health_state(), HealthState::Starting);
        assert!(!lifecycle.health_state().is_accepting());
    }

    #[test]
    fn transitions_are_visible_through_clones() {
        let lifecycle = Lifecycle::new();
        let probe = lifecycle.clone();

        lifecycle.set_ready();
        assert!(probe.health_state().is_accepting());

        lifecycle.set_draining();
        assert_eq!(probe.health_state(), HealthState::Draining);
        assert!(!probe.health_state().is_accepting());

        lifecycle.set_stopped();
        assert_eq!(probe.health_state().as_str(), "stopped");
    }
}
