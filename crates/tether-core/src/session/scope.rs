// ── Session scope ──
//
// A cancellable concurrency region bound to one `Connected` state.
// Tasks are tracked so the allocator can wait for them to stop before
// handing out the next scope.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{DeviceHandle, DeviceId};

/// Unit-of-work context for one connection.
///
/// Cheap to clone; equality is identity. Once cancelled, no new task can be
/// spawned and every running task is dropped at its next await point.
#[derive(Clone)]
pub struct SessionScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    generation: u64,
    epoch: u64,
    origin: DeviceHandle,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl SessionScope {
    /// Create a scope whose token is a child of `parent`, so shutting down
    /// the owner cancels every scope it ever produced.
    pub(crate) fn new(
        generation: u64,
        epoch: u64,
        origin: DeviceHandle,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                generation,
                epoch,
                origin,
                token: parent.child_token(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Monotonic counter, bumped for every scope the allocator creates.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Version of the connection state that produced this scope. A later
    /// `Connected` state for the same handle carries a different epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch
    }

    /// Handle of the connection that produced this scope.
    pub fn origin(&self) -> &DeviceHandle {
        &self.inner.origin
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn task_count(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            generation: self.inner.generation,
            device: self.inner.origin.id().clone(),
            token: self.inner.token.clone(),
        }
    }

    /// Spawn connection-scoped work.
    ///
    /// `work` receives a [`SessionContext`] for cooperative cancellation
    /// checks. The returned handle yields `None` if the scope was cancelled
    /// before the work completed.
    pub fn spawn<F, Fut>(&self, work: F) -> Result<JoinHandle<Option<Fut::Output>>, CoreError>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        if self.is_cancelled() {
            return Err(CoreError::ScopeClosed);
        }

        let token = self.inner.token.clone();
        let fut = work(self.context());

        // A task that races with `cancel_and_drain` still sees the token
        // first and never polls `fut`.
        Ok(self.inner.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => None,
                out = fut => Some(out),
            }
        }))
    }

    /// Cancel the scope and wait up to `timeout` for its tasks to stop.
    ///
    /// Returns `false` if tasks were still running when the timeout hit.
    /// That only happens for a task blocked inside a single poll; every
    /// other task is dropped at its next await point.
    pub(crate) async fn cancel_and_drain(&self, timeout: Duration) -> bool {
        self.inner.token.cancel();
        self.inner.tracker.close();

        if tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            debug!(generation = self.inner.generation, "session scope drained");
            true
        } else {
            warn!(
                generation = self.inner.generation,
                remaining = self.inner.tracker.len(),
                "session tasks still running after drain timeout"
            );
            false
        }
    }
}

impl PartialEq for SessionScope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SessionScope {}

impl fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionScope")
            .field("generation", &self.inner.generation)
            .field("device", self.inner.origin.id())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ── SessionContext ───────────────────────────────────────────────

/// Per-task view of the scope a task was spawned into.
#[derive(Debug, Clone)]
pub struct SessionContext {
    generation: u64,
    device: DeviceId,
    token: CancellationToken,
}

impl SessionContext {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Token for handing to APIs that take a `CancellationToken` directly.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
