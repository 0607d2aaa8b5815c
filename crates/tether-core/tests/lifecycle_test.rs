// Integration tests for `ConnectionManager`: connection lifecycle,
// session scope rebinding and the connected-metadata pipeline.
#![allow(clippy::unwrap_used)]

use std::pin::pin;
use std::time::Duration;

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::sync::mpsc;

use tether_core::{
    AuthEvent, ConnectionEvent, ConnectionManager, ConnectionState, CoreError, CurrentToken,
    DeviceHandle, ManagerConfig, Metadata, MetadataFeed,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn start() -> ConnectionManager {
    ConnectionManager::start(ManagerConfig::default()).unwrap()
}

fn device(id: &str) -> (DeviceHandle, MetadataFeed) {
    let feed = MetadataFeed::new();
    (DeviceHandle::new(id, feed.clone()), feed)
}

fn connect(manager: &ConnectionManager, handle: &DeviceHandle) {
    manager
        .report_connection_event(ConnectionEvent::Connecting)
        .unwrap();
    manager
        .report_connection_event(ConnectionEvent::ConnectedWith(handle.clone()))
        .unwrap();
}

fn login(token: &str) -> AuthEvent {
    AuthEvent::LoggedIn(SecretString::from(token.to_owned()))
}

// ── Connection state ────────────────────────────────────────────────

#[tokio::test]
async fn test_single_current_connection() {
    let manager = start();
    let (a, _) = device("A");
    let (b, _) = device("B");

    let script = [
        ConnectionEvent::Connecting,
        ConnectionEvent::ConnectedWith(a.clone()),
        ConnectionEvent::ConnectedWith(b.clone()),
        ConnectionEvent::Disconnected,
        ConnectionEvent::Connecting,
        ConnectionEvent::ConnectedWith(a.clone()),
    ];

    for event in script {
        let expected = event.clone().into_state();
        manager.report_connection_event(event).unwrap();

        let current = manager.current_connection_state();
        assert_eq!(current, expected);
        if let Some(handle) = current.connected_handle() {
            assert!(handle == &a || handle == &b);
        }
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_replay_on_subscribe() {
    let manager = start();
    let (a, _) = device("A");

    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();
    connect(&manager, &a);

    let mut states = manager.observe_connection_state();
    let first = states.next().await.unwrap();
    assert_eq!(first, ConnectionState::Connected { handle: a });

    manager.shutdown().await;
}

#[tokio::test]
async fn test_subscribers_see_transitions_in_order() {
    let manager = start();
    let (a, _) = device("A");

    let mut states = manager.observe_connection_state();
    assert_eq!(states.next().await.unwrap(), ConnectionState::Disconnected);

    manager
        .report_connection_event(ConnectionEvent::Connecting)
        .unwrap();
    assert_eq!(states.next().await.unwrap(), ConnectionState::Connecting);

    manager
        .report_connection_event(ConnectionEvent::ConnectedWith(a.clone()))
        .unwrap();
    assert_eq!(
        states.next().await.unwrap(),
        ConnectionState::Connected { handle: a }
    );

    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();
    assert_eq!(states.next().await.unwrap(), ConnectionState::Disconnected);

    manager.shutdown().await;
}

// ── Session scopes ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_duplicate_connected_keeps_scope() {
    let manager = start();
    let (a, _) = device("A");
    connect(&manager, &a);
    let first = manager.wait_for_session().await.unwrap();

    let mut scopes = manager.observe_session_scope();
    assert_eq!(scopes.next().await.unwrap(), Some(first.clone()));

    manager
        .report_connection_event(ConnectionEvent::ConnectedWith(a.clone()))
        .unwrap();
    let next = tokio::time::timeout(Duration::from_secs(1), scopes.next()).await;
    assert!(next.is_err(), "duplicate connected state produced a new scope");

    let second = manager.wait_for_session().await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_cancelled());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_replace() {
    let manager = start();
    let (a, _) = device("A");
    let (b, _) = device("B");
    connect(&manager, &a);
    let scope_a = manager.wait_for_session().await.unwrap();

    let work_a = manager
        .spawn_in_session(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    // Whether A was already cancelled when its replacement became visible.
    let mut scopes = manager.observe_session_scope();
    let watched = scope_a.clone();
    let watcher = tokio::spawn(async move {
        while let Some(item) = scopes.next().await {
            if item.as_ref().is_some_and(|scope| scope != &watched) {
                return Some(watched.is_cancelled());
            }
        }
        None
    });

    manager
        .report_connection_event(ConnectionEvent::ConnectedWith(b.clone()))
        .unwrap();
    let scope_b = manager.wait_for_session().await.unwrap();

    assert_ne!(scope_a, scope_b);
    assert_eq!(scope_b.origin(), &b);
    assert!(scope_b.generation() > scope_a.generation());
    assert_eq!(watcher.await.unwrap(), Some(true));
    assert_eq!(work_a.await.unwrap(), None);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fast_same_handle_reconnect_gets_fresh_scope() {
    let manager = start();
    let (a, _) = device("A");
    connect(&manager, &a);
    let first = manager.wait_for_session().await.unwrap();

    let old_work = manager
        .spawn_in_session(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

    // Reported back to back, so the allocator only wakes once.
    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();
    connect(&manager, &a);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = manager.wait_for_session().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(second.origin(), &a);
    assert!(first.is_cancelled());
    assert_eq!(old_work.await.unwrap(), None);

    let task = manager
        .spawn_in_session(|ctx| async move { ctx.generation() })
        .unwrap();
    assert_eq!(task.await.unwrap(), Some(second.generation()));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_scope_closed_until_next_connection() {
    let manager = start();
    let (a, _) = device("A");
    connect(&manager, &a);
    let scope = manager.wait_for_session().await.unwrap();

    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();

    for _ in 0..3 {
        let err = manager.spawn_in_session(|_| async {}).unwrap_err();
        assert_eq!(err, CoreError::ScopeClosed);
        tokio::task::yield_now().await;
    }
    scope.cancelled().await;
    assert!(manager.current_session_scope().is_none());

    let (b, _) = device("B");
    connect(&manager, &b);
    manager.wait_for_session().await.unwrap();

    let task = manager
        .spawn_in_session(|ctx| async move { ctx.device().to_string() })
        .unwrap();
    assert_eq!(task.await.unwrap().as_deref(), Some("B"));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_session_task_sees_cancellation() {
    let manager = start();
    let (a, _) = device("A");
    connect(&manager, &a);
    manager.wait_for_session().await.unwrap();

    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let task = manager
        .spawn_in_session(|ctx| async move {
            let _ = started_tx.send(ctx.generation());
            ctx.cancelled().await;
            "unreachable"
        })
        .unwrap();

    let generation = started_rx.await.unwrap();
    assert!(manager.is_current_generation(generation));

    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();
    assert!(!manager.is_current_generation(generation));
    assert_eq!(task.await.unwrap(), None);

    manager.shutdown().await;
}

// ── Connected metadata ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_late_metadata_is_rejected() {
    let manager = start();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let metadata = manager.observe_connected_metadata();
    tokio::spawn(async move {
        let mut metadata = pin!(metadata);
        while let Some(item) = metadata.next().await {
            if tx.send(item).is_err() {
                break;
            }
        }
    });

    let (a, feed_a) = device("A");
    connect(&manager, &a);
    // Let the pipeline subscribe to A's metadata source.
    tokio::task::yield_now().await;

    let (b, feed_b) = device("B");
    manager
        .report_connection_event(ConnectionEvent::ConnectedWith(b))
        .unwrap();
    feed_a.publish(Metadata::new("watch-a", "v3.12"));
    feed_b.publish(Metadata::new("watch-b", "v4.4"));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.name, "watch-b");

    let extra = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert!(extra.is_err(), "stale metadata forwarded: {extra:?}");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_absent_metadata_is_skipped() {
    let manager = start();
    let mut metadata = pin!(manager.observe_connected_metadata());

    let (a, feed_a) = device("A");
    connect(&manager, &a);
    feed_a.clear();
    feed_a.publish(Metadata::new("watch-a", "v4.4").with_capability("health"));

    let first = metadata.next().await.unwrap();
    assert_eq!(first.name, "watch-a");
    assert!(first.supports("health"));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_metadata_per_connection() {
    let manager = start();
    let mut metadata = pin!(manager.observe_connected_metadata());

    let (a, feed_a) = device("A");
    feed_a.publish(Metadata::new("watch-a", "v4.4"));
    connect(&manager, &a);
    assert_eq!(metadata.next().await.unwrap().name, "watch-a");

    manager
        .report_connection_event(ConnectionEvent::Disconnected)
        .unwrap();

    let (b, feed_b) = device("B");
    connect(&manager, &b);
    feed_b.publish(Metadata::new("watch-b", "v4.4"));
    assert_eq!(metadata.next().await.unwrap().name, "watch-b");

    manager.shutdown().await;
}

// ── Auth token ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_token_and_connection_are_independent() {
    let manager = start();
    let mut states = manager.observe_connection_state();
    let mut tokens = manager.observe_auth_token();
    assert_eq!(states.next().await.unwrap(), ConnectionState::Disconnected);
    assert_eq!(tokens.next().await.unwrap(), CurrentToken::LoggedOut);

    manager.report_auth_event(login("abc"));
    manager.report_auth_event(AuthEvent::LoggedOut);
    manager.report_auth_event(login("def"));
    let quiet = tokio::time::timeout(Duration::from_secs(1), states.next()).await;
    assert!(quiet.is_err(), "token change leaked into connection state");
    assert!(tokens.next().await.unwrap().is_logged_in());

    let (a, _) = device("A");
    connect(&manager, &a);
    let quiet = tokio::time::timeout(Duration::from_secs(1), tokens.next()).await;
    assert!(quiet.is_err(), "connection change leaked into token state");
    assert!(states.next().await.unwrap().is_connected());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_token_defaults_to_logged_out() {
    let manager = start();
    assert_eq!(manager.current_auth_token(), CurrentToken::LoggedOut);

    manager.report_auth_event(login("abc"));
    assert!(manager.current_auth_token().is_logged_in());

    manager.shutdown().await;
}
