//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod ai_template_repo;
pub mod analytics_repo;
pub mod credential_repo;
pub mod event_repo;
pub mod execution_log_repo;
pub mod export_template_repo;
pub mod job_repo;
pub mod notification_repo;
pub mod organization_repo;
pub mod session_repo;
pub mod subscription_repo;
pub mod tenant_repo;
pub mod user_repo;
pub mod workflow_repo;
pub mod workflow_template_repo;
pub mod ws_session_repo;

pub use ai_template_repo::AiTemplateRepo;
pub use analytics_repo::AnalyticsRepo;
pub use credential_repo::CredentialRepo;
pub use event_repo::EventRepo;
pub use execution_log_repo::ExecutionLogRepo;
pub use export_template_repo::{ExportRunRepo, ExportTemplateRepo};
pub use job_repo::JobRepo;
pub use notification_repo::NotificationRepo;
pub use organization_repo::OrganizationRepo;
pub use session_repo::SessionRepo;
pub use subscription_repo::{BillingEventRepo, SubscriptionRepo};
pub use tenant_repo::TenantRepo;
pub use user_repo::UserRepo;
pub use workflow_repo::WorkflowRepo;
pub use workflow_template_repo::{WorkflowInstanceRepo, WorkflowTemplateRepo};
pub use ws_session_repo::WsSessionRepo;
