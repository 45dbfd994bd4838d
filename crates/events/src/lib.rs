//! PumpFlix event bus and live-status plumbing.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the canonical domain event envelope.
//! - [`EventPersistence`]: background service that durably writes every
//!   event to the `events` table.
//! - [`notify`]: bridge between processes over Postgres `NOTIFY`, so that
//!   status changes produced by the worker reach the API's WebSocket
//!   clients.

pub mod bus;
pub mod event_types;
pub mod notify;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use notify::{publish_notify, NotifyRelay, NOTIFY_CHANNEL};
pub use persistence::EventPersistence;
