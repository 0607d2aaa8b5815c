//! Connection lifecycle core for a wearable companion application.
//!
//! This crate tracks the single companion device the app talks to and ties
//! connection-scoped work to the lifetime of that connection:
//!
//! - **[`ConnectionManager`]**: Wiring root. The transport reports
//!   [`ConnectionEvent`]s, the auth layer reports [`AuthEvent`]s; feature
//!   code observes the resulting state and spawns work with
//!   [`spawn_in_session()`](ConnectionManager::spawn_in_session).
//!
//! - **[`StateSlot<T>`]**: Reactive single-value store built on
//!   `tokio::sync::watch`. Subscribers get the current value first, then
//!   every change in publish order; slow subscribers are conflated to the
//!   latest value.
//!
//! - **[`SessionScope`]**: Cancellable task region (`CancellationToken` +
//!   `TaskTracker`) allocated per `Connected` state. The previous scope is
//!   cancelled and drained before its replacement is published.
//!
//! - **Connected metadata**: [`observe_connected_metadata()`](ConnectionManager::observe_connected_metadata)
//!   switches to the metadata source of whichever device is connected and
//!   never forwards a late emission from an abandoned connection.
//!
//! - **Domain model** ([`model`]): [`ConnectionState`], [`DeviceHandle`],
//!   [`Metadata`], [`CurrentToken`].

pub mod auth;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod slot;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::AuthTokenState;
pub use config::ManagerConfig;
pub use error::CoreError;
pub use manager::ConnectionManager;
pub use session::{SessionContext, SessionScope};
pub use slot::{SlotStream, Stamped, StateSlot};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AuthEvent, ConnectionEvent, ConnectionState, CurrentToken, DeviceHandle, DeviceId, Metadata,
    MetadataFeed, MetadataSource, MetadataStream,
};
