//! Row structs and the insert/patch inputs that go with them.

pub mod ai_template;
pub mod analytics;
pub mod credential;
pub mod event;
pub mod execution;
pub mod export_template;
pub mod job;
pub mod notification;
pub mod organization;
pub mod session;
pub mod subscription;
pub mod user;
pub mod workflow;
pub mod workflow_template;
pub mod ws_session;
