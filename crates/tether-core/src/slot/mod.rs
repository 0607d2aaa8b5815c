// ── Reactive state slots ──
//
// A slot holds exactly one current value and broadcasts every change
// to its subscribers via a `watch` channel. Publishing never blocks:
// slow subscribers only ever miss intermediate values, never the latest.

mod stream;

use std::sync::Arc;

use tokio::sync::watch;

pub use stream::SlotStream;

/// A slot value together with the number of changes that produced it.
///
/// The version starts at 0 and increases by one on every change, so two
/// reads carrying the same version saw the same publish even when the
/// values in between were conflated away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T> {
    pub version: u64,
    pub value: T,
}

/// Single-value observable store shared by one publisher and many readers.
///
/// Cheaply cloneable; every clone refers to the same value. Publishes are
/// serialised by the underlying channel, so all subscribers observe the
/// same relative order. Publishing a value equal to the current one is a
/// no-op and wakes nobody.
///
/// Subscriptions end once every clone of the slot has been dropped.
pub struct StateSlot<T> {
    tx: Arc<watch::Sender<Stamped<T>>>,
}

impl<T> Clone for StateSlot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> StateSlot<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Stamped {
            version: 0,
            value: initial,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Store `value` as current and notify subscribers.
    ///
    /// Returns `true` if the value changed.
    pub fn publish(&self, value: T) -> bool {
        // `send_if_modified` updates even with zero receivers.
        self.tx.send_if_modified(|current| {
            if current.value == value {
                false
            } else {
                current.version += 1;
                current.value = value;
                true
            }
        })
    }

    /// Compute the next value from the current one under the slot's lock.
    ///
    /// `next` returns `None` to leave the slot untouched. Returns `true` if
    /// the value changed.
    pub fn update<F>(&self, next: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        self.tx.send_if_modified(|current| match next(&current.value) {
            Some(value) if value != current.value => {
                current.version += 1;
                current.value = value;
                true
            }
            _ => false,
        })
    }

    /// The presently held value.
    pub fn current(&self) -> T {
        self.tx.borrow().value.clone()
    }

    /// The presently held value with its version, read atomically.
    pub fn current_stamped(&self) -> Stamped<T> {
        self.tx.borrow().clone()
    }

    /// Lazy stream yielding the current value, then every later change.
    pub fn subscribe(&self) -> SlotStream<T> {
        SlotStream::new(self.tx.subscribe())
    }

    /// Raw receiver for consumers that drive their own `select!` loop.
    ///
    /// The value current at subscription time counts as already seen.
    pub fn watch(&self) -> watch::Receiver<Stamped<T>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
