// ── Runtime manager configuration ──
//
// Tuning knobs for the connection manager. Core never touches disk:
// `tether-config` (or any other embedder) builds a `ManagerConfig`
// and hands it in.

use std::time::Duration;

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// How long the allocator waits for the tasks of a cancelled session
    /// scope to stop before it logs a warning and publishes the next scope
    /// anyway.
    ///
    /// Past this timeout the replacement scope is published before every
    /// task of the old one has finished, so cancel-before-replace then
    /// only holds for the cancellation signal, not for task completion.
    /// Only a task blocked inside a single poll can outlive the timeout:
    /// it has already observed cancellation and is never polled past its
    /// next await point.
    pub scope_drain_timeout: Duration,
    /// Reject non-canonical transport events (e.g. `Disconnected` straight
    /// to `Connected`) with [`CoreError::InvalidTransition`](crate::CoreError)
    /// instead of accepting them with a warning.
    pub enforce_canonical_transitions: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scope_drain_timeout: Duration::from_secs(5),
            enforce_canonical_transitions: false,
        }
    }
}
