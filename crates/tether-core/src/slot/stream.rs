use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::Stamped;

/// `Stream` adapter over a [`StateSlot`](super::StateSlot) subscription.
///
/// The first item is the value current when the stream was created; after
/// that it yields each new value. Intermediate values may be conflated if
/// the consumer falls behind. Ends when the slot is dropped.
pub struct SlotStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<Stamped<T>>,
}

impl<T: Clone + Send + Sync + 'static> SlotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Stamped<T>>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream for SlotStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream is Unpin.
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|item| item.map(|stamped| stamped.value))
    }
}
