//! Event type names published on the bus.

pub const WORKFLOW_CREATED: &str = "workflow.created";
pub const WORKFLOW_UPDATED: &str = "workflow.updated";
pub const WORKFLOW_ARCHIVED: &str = "workflow.archived";
pub const WORKFLOW_DELETED: &str = "workflow.deleted";

pub const EXECUTION_QUEUED: &str = "execution.queued";
pub const EXECUTION_STARTED: &str = "execution.started";
pub const EXECUTION_STEP: &str = "execution.step";
pub const EXECUTION_SUCCEEDED: &str = "execution.succeeded";
pub const EXECUTION_FAILED: &str = "execution.failed";
pub const EXECUTION_CANCELLED: &str = "execution.cancelled";

pub const EXPORT_COMPLETED: &str = "export.completed";
pub const EXPORT_FAILED: &str = "export.failed";

pub const SUBSCRIPTION_CHANGED: &str = "billing.subscription_changed";
pub const PAYMENT_FAILED: &str = "billing.payment_failed";

pub const USAGE_THRESHOLD: &str = "usage.threshold";
pub const USAGE_LIMIT_REACHED: &str = "usage.limit_reached";

/// Entity kinds used in `source_entity_type`.
pub const ENTITY_WORKFLOW: &str = "workflow";
pub const ENTITY_EXECUTION: &str = "execution";
pub const ENTITY_EXPORT_TEMPLATE: &str = "export_template";
pub const ENTITY_SUBSCRIPTION: &str = "subscription";
