//! WebSocket live-status channel.
//!
//! Clients authenticate with `?token=`, then subscribe to `org:`,
//! `workflow:` or `execution:` channels. [`relay`] fans bus events out to
//! the matching subscribers.

mod handler;
pub mod heartbeat;
pub mod manager;
pub mod relay;

pub use handler::{ws_handler, ClientMessage};
pub use manager::WsManager;
