//! Notification routing infrastructure.
//!
//! The [`NotificationRouter`] subscribes to the event bus and turns the
//! events users must act on (failed executions, usage limits, billing
//! problems) into stored notifications plus a live WebSocket push.

pub mod router;

pub use router::NotificationRouter;
