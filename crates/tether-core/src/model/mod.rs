// ── Domain model ──
//
// The values that flow through the reactive slots: connection state,
// device handles and metadata, and the authentication token.

pub mod connection;
pub mod device;
pub mod metadata;
pub mod token;

pub use connection::{ConnectionEvent, ConnectionState};
pub use device::{DeviceHandle, DeviceId, MetadataFeed, MetadataSource, MetadataStream};
pub use metadata::Metadata;
pub use token::{AuthEvent, CurrentToken};
