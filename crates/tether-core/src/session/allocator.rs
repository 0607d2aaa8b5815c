// ── Session scope allocator ──
//
// Follows the connection slot and keeps exactly one live session scope
// per `Connected` value. The previous scope is always cancelled and
// drained before its replacement is published.
//
// Scopes are matched by connection epoch, not by handle: the slot may
// conflate `Disconnected` → `Connecting` → `Connected(A)` down to a
// single wake-up, and that reconnect still needs a fresh scope.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SessionScope;
use crate::model::ConnectionState;
use crate::slot::{Stamped, StateSlot};

pub(crate) struct SessionAllocator {
    scopes: StateSlot<Option<SessionScope>>,
    root: CancellationToken,
    drain_timeout: Duration,
    generation: u64,
}

impl SessionAllocator {
    pub(crate) fn new(
        scopes: StateSlot<Option<SessionScope>>,
        root: CancellationToken,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            scopes,
            root,
            drain_timeout,
            generation: 0,
        }
    }

    /// Follow `states` until it closes or `shutdown` fires, then release
    /// the live scope.
    pub(crate) async fn run(
        mut self,
        mut states: watch::Receiver<Stamped<ConnectionState>>,
        shutdown: CancellationToken,
    ) {
        loop {
            let state = states.borrow_and_update().clone();
            self.apply(&state).await;

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.release().await;
        debug!("session allocator stopped");
    }

    /// Reconcile the live scope with `state`.
    pub(crate) async fn apply(&mut self, state: &Stamped<ConnectionState>) {
        let live = self.scopes.current();

        match (state.value.connected_handle(), live) {
            (Some(_), Some(scope)) if scope.epoch() == state.version => {
                debug!(
                    generation = scope.generation(),
                    "duplicate connected state, keeping scope"
                );
            }
            (Some(handle), live) => {
                if let Some(previous) = live {
                    self.retire(&previous).await;
                }

                self.generation += 1;
                let scope = SessionScope::new(
                    self.generation,
                    state.version,
                    handle.clone(),
                    &self.root,
                );
                info!(
                    generation = self.generation,
                    epoch = state.version,
                    device = %handle.id(),
                    "session scope opened"
                );
                self.scopes.publish(Some(scope));
            }
            (None, Some(previous)) => {
                self.retire(&previous).await;
                self.scopes.publish(None);
            }
            (None, None) => {}
        }
    }

    async fn release(&mut self) {
        if let Some(scope) = self.scopes.current() {
            self.retire(&scope).await;
            self.scopes.publish(None);
        }
    }

    async fn retire(&self, scope: &SessionScope) {
        scope.cancel_and_drain(self.drain_timeout).await;
        info!(
            generation = scope.generation(),
            device = %scope.origin().id(),
            "session scope closed"
        );
    }
}
