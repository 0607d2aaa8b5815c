// ── Connected-device metadata pipeline ──
//
// Switches to the metadata source of whichever device is connected.
// The previous device's subscription is always dropped before the new
// state is acted on, so a late emission from an earlier connection can
// never reach the output.

use std::sync::Arc;

use async_stream::stream;
use futures_core::Stream;
use futures_util::{StreamExt, future};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::model::{ConnectionState, DeviceHandle, Metadata};
use crate::slot::Stamped;

enum Step {
    /// First present metadata of the current connection.
    Emit(Arc<Metadata>),
    /// The connection state moved on before metadata arrived.
    Superseded,
    /// Nothing to forward for the current state.
    Idle,
    /// The connection slot is gone.
    Closed,
}

/// Metadata of the connected device, one item per connection.
///
/// Each `Connected` state contributes at most one item: the first present
/// emission of its handle's metadata source. Nothing is emitted while not
/// connected. A reconnect to the same handle counts as a new connection.
/// Ends when the connection slot is dropped.
pub fn connected_metadata(
    mut states: watch::Receiver<Stamped<ConnectionState>>,
) -> impl Stream<Item = Arc<Metadata>> + Send + 'static {
    stream! {
        loop {
            let state = states.borrow_and_update().value.clone();
            let step = match state.connected_handle() {
                Some(handle) => first_metadata(handle, &mut states).await,
                None => Step::Idle,
            };

            match step {
                Step::Emit(metadata) => {
                    debug!(device = %metadata.name, "connected device metadata available");
                    yield metadata;
                }
                Step::Superseded => {
                    trace!("metadata subscription abandoned");
                    continue;
                }
                Step::Closed => break,
                Step::Idle => {}
            }

            if states.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Wait for the first present metadata from `handle`, giving up as soon as
/// the connection state changes. State changes win ties.
async fn first_metadata(
    handle: &DeviceHandle,
    states: &mut watch::Receiver<Stamped<ConnectionState>>,
) -> Step {
    let mut feed = handle
        .subscribe_metadata()
        .filter_map(future::ready);

    tokio::select! {
        biased;
        changed = states.changed() => {
            if changed.is_ok() { Step::Superseded } else { Step::Closed }
        }
        first = feed.next() => match first {
            Some(metadata) => Step::Emit(metadata),
            None => Step::Idle,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::pin::pin;
    use std::time::Duration;

    use crate::model::MetadataFeed;
    use crate::slot::StateSlot;

    fn connect(states: &StateSlot<ConnectionState>, id: &str) -> MetadataFeed {
        let feed = MetadataFeed::new();
        states.publish(ConnectionState::Connected {
            handle: DeviceHandle::new(id, feed.clone()),
        });
        feed
    }

    #[tokio::test]
    async fn forwards_first_present_metadata() {
        let states = StateSlot::new(ConnectionState::Disconnected);
        let mut out = pin!(connected_metadata(states.watch()));

        let feed = connect(&states, "a");
        feed.publish(Metadata::new("first", "v1"));

        let meta = out.next().await.unwrap();
        assert_eq!(meta.name, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn later_emissions_of_same_connection_are_ignored() {
        let states = StateSlot::new(ConnectionState::Disconnected);
        let mut out = pin!(connected_metadata(states.watch()));

        let feed = connect(&states, "a");
        feed.publish(Metadata::new("first", "v1"));
        assert_eq!(out.next().await.unwrap().name, "first");

        feed.publish(Metadata::new("second", "v2"));
        let next = tokio::time::timeout(Duration::from_secs(1), out.next()).await;
        assert!(next.is_err(), "single-shot metadata emitted twice");
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_emitted_while_disconnected() {
        let states = StateSlot::new(ConnectionState::Connecting);
        let mut out = pin!(connected_metadata(states.watch()));

        states.publish(ConnectionState::Disconnected);
        let next = tokio::time::timeout(Duration::from_secs(1), out.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn same_handle_reconnect_emits_again() {
        let states = StateSlot::new(ConnectionState::Disconnected);
        let mut out = pin!(connected_metadata(states.watch()));

        let feed = MetadataFeed::new();
        let handle = DeviceHandle::new("a", feed.clone());
        states.publish(ConnectionState::Connected {
            handle: handle.clone(),
        });
        feed.publish(Metadata::new("first", "v1"));
        assert_eq!(out.next().await.unwrap().name, "first");

        states.publish(ConnectionState::Disconnected);
        states.publish(ConnectionState::Connecting);
        states.publish(ConnectionState::Connected { handle });
        assert_eq!(out.next().await.unwrap().name, "first");
    }

    #[tokio::test]
    async fn ends_when_slot_dropped() {
        let states = StateSlot::new(ConnectionState::Disconnected);
        let mut out = pin!(connected_metadata(states.watch()));
        drop(states);
        assert!(out.next().await.is_none());
    }
}
