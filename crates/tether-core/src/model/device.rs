// ── Device identity and handles ──
//
// A `DeviceHandle` is the transport's token for one physical connection.
// Two handles are the same connection only if they share an allocation;
// reconnecting to the same watch yields a new, distinct handle.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::slot::StateSlot;

/// Stream of metadata emissions from a device. `None` means "not known yet".
pub type MetadataStream = BoxStream<'static, Option<Arc<Metadata>>>;

// ── DeviceId ────────────────────────────────────────────────────────

/// Transport-level identifier of a physical device (usually its address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── MetadataSource ──────────────────────────────────────────────────

/// Collaborator-owned reactive source of a device's metadata.
pub trait MetadataSource: Send + Sync {
    /// Start a fresh subscription. Dropping the stream unsubscribes.
    fn subscribe_metadata(&self) -> MetadataStream;
}

/// Ready-made [`MetadataSource`] for transports: create it empty when the
/// link comes up, then [`publish`](Self::publish) once the handshake
/// delivers the device's attributes.
#[derive(Clone)]
pub struct MetadataFeed {
    slot: StateSlot<Option<Arc<Metadata>>>,
}

impl MetadataFeed {
    pub fn new() -> Self {
        Self {
            slot: StateSlot::new(None),
        }
    }

    pub fn publish(&self, metadata: Metadata) {
        self.slot.publish(Some(Arc::new(metadata)));
    }

    pub fn clear(&self) {
        self.slot.publish(None);
    }

    pub fn current(&self) -> Option<Arc<Metadata>> {
        self.slot.current()
    }
}

impl Default for MetadataFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSource for MetadataFeed {
    fn subscribe_metadata(&self) -> MetadataStream {
        self.slot.subscribe().boxed()
    }
}

// ── DeviceHandle ────────────────────────────────────────────────────

/// Handle to one live connection, as reported by the transport.
///
/// Cheap to clone. Equality is identity: clones of one handle compare
/// equal, independently created handles never do, even for the same
/// [`DeviceId`].
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: DeviceId,
    source: Box<dyn MetadataSource>,
}

impl DeviceHandle {
    pub fn new(id: impl Into<DeviceId>, source: impl MetadataSource + 'static) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: id.into(),
                source: Box::new(source),
            }),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.inner.id
    }

    pub fn subscribe_metadata(&self) -> MetadataStream {
        self.inner.source.subscribe_metadata()
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DeviceHandle {}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}
