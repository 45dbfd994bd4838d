//! In-process maintenance loops of the API server. Queue work belongs to
//! the worker; these only tidy state the API owns.

pub mod billing_periods;
pub mod session_cleanup;
