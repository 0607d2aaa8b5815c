// ── Connection manager ──
//
// Wiring root for the core: owns the connection and token slots, runs
// the session allocator, and exposes the inbound report_* calls and the
// outbound observe_* streams.

use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::AuthTokenState;
use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::model::{AuthEvent, ConnectionEvent, ConnectionState, CurrentToken, Metadata};
use crate::pipeline;
use crate::session::{SessionAllocator, SessionContext, SessionScope};
use crate::slot::{SlotStream, StateSlot};

/// The main entry point for the transport, auth and feature layers.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Construct once at startup
/// with [`start()`](Self::start) and hand clones to every consumer.
///
/// Every change of connection state bumps the connection slot's version.
/// A session scope belongs to the exact version that opened it, so a
/// reconnect to the same handle never inherits the previous scope.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    connection: StateSlot<ConnectionState>,
    auth: AuthTokenState,
    scopes: StateSlot<Option<SessionScope>>,
    cancel: CancellationToken,
    allocator: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Build the slots and spawn the session allocator on the current
    /// Tokio runtime.
    ///
    /// Fails with [`CoreError::NoRuntime`] outside a runtime.
    pub fn start(config: ManagerConfig) -> Result<Self, CoreError> {
        let runtime = Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        let connection = StateSlot::new(ConnectionState::Disconnected);
        let scopes = StateSlot::new(None);
        let cancel = CancellationToken::new();

        let allocator = SessionAllocator::new(
            scopes.clone(),
            cancel.child_token(),
            config.scope_drain_timeout,
        );
        let handle = runtime.spawn(allocator.run(connection.watch(), cancel.clone()));
        debug!(?config, "connection manager started");

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                connection,
                auth: AuthTokenState::new(),
                scopes,
                cancel,
                allocator: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Record a connectivity signal from the transport.
    ///
    /// Non-canonical transitions are logged and accepted unless
    /// [`enforce_canonical_transitions`](ManagerConfig::enforce_canonical_transitions)
    /// is set, in which case they are rejected and the state is unchanged.
    pub fn report_connection_event(&self, event: ConnectionEvent) -> Result<(), CoreError> {
        let next = event.into_state();
        let strict = self.inner.config.enforce_canonical_transitions;
        let mut rejected = None;

        let changed = self.inner.connection.update(|current| {
            if !current.can_transition_to(&next) {
                if strict {
                    rejected = Some(CoreError::InvalidTransition {
                        from: current.label(),
                        to: next.label(),
                    });
                    return None;
                }
                warn!(
                    from = current.label(),
                    to = next.label(),
                    "non-canonical connection transition"
                );
            }
            Some(next)
        });

        if let Some(err) = rejected {
            warn!(error = %err, "connection event rejected");
            return Err(err);
        }
        if changed {
            debug!(state = self.inner.connection.current().label(), "connection state changed");
        }
        Ok(())
    }

    /// Record a login / logout from the authentication collaborator.
    pub fn report_auth_event(&self, event: AuthEvent) {
        self.inner.auth.apply(event);
    }

    // ── Outbound ─────────────────────────────────────────────────

    pub fn current_connection_state(&self) -> ConnectionState {
        self.inner.connection.current()
    }

    pub fn observe_connection_state(&self) -> SlotStream<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// Metadata of each connected device, as it becomes available.
    ///
    /// Every call starts an independent pipeline.
    pub fn observe_connected_metadata(&self) -> impl Stream<Item = Arc<Metadata>> + Send + 'static {
        pipeline::connected_metadata(self.inner.connection.watch())
    }

    pub fn current_auth_token(&self) -> CurrentToken {
        self.inner.auth.current()
    }

    pub fn observe_auth_token(&self) -> SlotStream<CurrentToken> {
        self.inner.auth.subscribe()
    }

    /// Raw scope slot, including the `None` published on disconnect.
    pub fn observe_session_scope(&self) -> SlotStream<Option<SessionScope>> {
        self.inner.scopes.subscribe()
    }

    /// The live session scope, if the device is connected and the scope
    /// belongs to the current connection.
    ///
    /// Checked against the connection slot directly, so a scope is never
    /// returned once its connection has been reported gone, even before
    /// the allocator has cancelled it. That includes a reconnect to the
    /// same handle the allocator has not caught up with yet.
    pub fn current_session_scope(&self) -> Option<SessionScope> {
        let scope = self.inner.scopes.current()?;
        let state = self.inner.connection.current_stamped();
        let live = state.version == scope.epoch()
            && state
                .value
                .connected_handle()
                .is_some_and(|handle| handle == scope.origin());
        (live && !scope.is_cancelled()).then_some(scope)
    }

    /// Spawn work bound to the current connection.
    ///
    /// Fails with [`CoreError::ScopeClosed`] when there is no live scope.
    pub fn spawn_in_session<F, Fut>(
        &self,
        work: F,
    ) -> Result<JoinHandle<Option<Fut::Output>>, CoreError>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.current_session_scope()
            .ok_or(CoreError::ScopeClosed)?
            .spawn(work)
    }

    /// Whether `generation` still identifies the live session scope.
    pub fn is_current_generation(&self, generation: u64) -> bool {
        self.current_session_scope()
            .is_some_and(|scope| scope.generation() == generation)
    }

    /// Wait until the scope for the current connection has been allocated.
    ///
    /// Fails with [`CoreError::ScopeClosed`] if the device is not connected,
    /// stops being connected while waiting, or the manager shuts down.
    pub async fn wait_for_session(&self) -> Result<SessionScope, CoreError> {
        let mut states = self.inner.connection.watch();
        let mut scopes = self.inner.scopes.watch();

        loop {
            let connected = states.borrow_and_update().value.is_connected();
            if self.inner.cancel.is_cancelled() || !connected {
                return Err(CoreError::ScopeClosed);
            }
            drop(scopes.borrow_and_update());
            if let Some(scope) = self.current_session_scope() {
                return Ok(scope);
            }

            tokio::select! {
                () = self.inner.cancel.cancelled() => return Err(CoreError::ScopeClosed),
                changed = states.changed() => changed.map_err(|_| CoreError::ScopeClosed)?,
                changed = scopes.changed() => changed.map_err(|_| CoreError::ScopeClosed)?,
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Stop the allocator and cancel every session scope.
    ///
    /// Idempotent. Slots keep their last value; streams end once the last
    /// clone of the manager is dropped.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.allocator.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "session allocator task failed");
            }
        }
        debug!("connection manager shut down");
    }
}
