//! Request extractors and middleware.
//!
//! - [`auth::AuthUser`] -- caller identity from a JWT bearer token.
//! - [`rbac::RequireAdmin`] / [`rbac::RequireEditor`] -- minimum role.
//! - [`limits`] -- subscription plan checks.
//! - [`metrics::track_metrics`] -- per-route request counters.

pub mod auth;
pub mod limits;
pub mod metrics;
pub mod rbac;
