//! PumpFlix background worker.
//!
//! Claims jobs from the Postgres queue, runs workflow executions and
//! exports, and queues periodic work. Status changes reach the API process
//! through Postgres `NOTIFY`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod nodes;
pub mod runner;
pub mod scheduler;
