//! PumpFlix domain rules.
//!
//! Everything in this crate is free of I/O so that the API server, the
//! worker, and the repository layer can share the same validation and
//! limit logic.

pub mod billing;
pub mod channels;
pub mod crypto;
pub mod error;
pub mod export_template;
pub mod hashing;
pub mod jobs;
pub mod naming;
pub mod pagination;
pub mod plans;
pub mod roles;
pub mod types;
pub mod workflow;
