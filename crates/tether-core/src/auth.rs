// ── Auth token state ──
//
// Process-wide login status. Independent of the connection lifecycle;
// mutated only by the authentication collaborator.

use tracing::info;

use crate::model::{AuthEvent, CurrentToken};
use crate::slot::{SlotStream, StateSlot};

/// Reactive holder for the [`CurrentToken`], starting out `LoggedOut`.
#[derive(Clone)]
pub struct AuthTokenState {
    slot: StateSlot<CurrentToken>,
}

impl AuthTokenState {
    pub fn new() -> Self {
        Self {
            slot: StateSlot::new(CurrentToken::LoggedOut),
        }
    }

    /// Apply an event from the authentication collaborator.
    pub fn apply(&self, event: AuthEvent) {
        let token = CurrentToken::from(event);
        let logged_in = token.is_logged_in();
        if self.slot.publish(token) {
            info!(logged_in, "auth token changed");
        }
    }

    pub fn current(&self) -> CurrentToken {
        self.slot.current()
    }

    pub fn subscribe(&self) -> SlotStream<CurrentToken> {
        self.slot.subscribe()
    }
}

impl Default for AuthTokenState {
    fn default() -> Self {
        Self::new()
    }
}
