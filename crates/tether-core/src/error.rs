// ── Core error types ──
//
// The reactive slots never fail. The only failure surfaced by the core
// is an attempt to spawn connection-scoped work when no live session
// exists, plus the opt-in rejection of non-canonical transport events
// and starting the manager without a runtime.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The session scope was cancelled, or the device is not connected.
    ///
    /// Callers usually skip the connection-scoped action.
    #[error("Session scope closed")]
    ScopeClosed,

    /// The transport reported an event that the canonical state machine
    /// does not allow. Only raised when
    /// [`ManagerConfig::enforce_canonical_transitions`](crate::ManagerConfig)
    /// is set.
    #[error("Invalid connection transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// [`ConnectionManager::start`](crate::ConnectionManager::start) was
    /// called outside a Tokio runtime.
    #[error("No Tokio runtime available to run the session allocator")]
    NoRuntime,
}
