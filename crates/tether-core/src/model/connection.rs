// ── Connection state machine ──

use strum::IntoStaticStr;

use super::DeviceHandle;

/// Relationship between the application and the companion device.
///
/// `Disconnected` → `Connecting` → `Connected`, and back to `Disconnected`
/// on handshake failure or link loss. A `Connected` value owns the only
/// valid [`DeviceHandle`]; once the state moves on, that handle must not
/// be used again.
#[derive(Debug, Clone, Default, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        handle: DeviceHandle,
    },
}

impl ConnectionState {
    /// The live handle, or `None` unless connected.
    pub fn connected_handle(&self) -> Option<&DeviceHandle> {
        match self {
            Self::Connected { handle } => Some(handle),
            Self::Disconnected | Self::Connecting => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Short lowercase name for logs and output.
    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// Whether moving to `next` follows the canonical state machine.
    ///
    /// Repeating the current state is always allowed. A `Connected` state
    /// may be replaced by a connection with a different handle (reconnect
    /// without an intervening disconnect report).
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected { .. } | Self::Disconnected)
                | (Self::Connected { .. }, Self::Disconnected | Self::Connected { .. })
        )
    }
}

/// Raw connectivity signal reported by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    ConnectedWith(DeviceHandle),
    Disconnected,
}

impl ConnectionEvent {
    pub fn into_state(self) -> ConnectionState {
        match self {
            Self::Connecting => ConnectionState::Connecting,
            Self::ConnectedWith(handle) => ConnectionState::Connected { handle },
            Self::Disconnected => ConnectionState::Disconnected,
        }
    }
}

impl From<ConnectionEvent> for ConnectionState {
    fn from(event: ConnectionEvent) -> Self {
        event.into_state()
    }
}
