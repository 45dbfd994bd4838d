//! Request handlers, one module per resource.
//!
//! Handlers validate input with `pumpflix_core` rules, delegate persistence
//! to the repositories in `pumpflix_db` and map errors via
//! [`AppError`](crate::error::AppError).

pub mod ai_templates;
pub mod analytics;
pub mod auth;
pub mod billing;
pub mod credentials;
pub mod executions;
pub mod export_templates;
pub mod notifications;
pub mod organization;
pub mod system;
pub mod templates;
pub mod workflows;
