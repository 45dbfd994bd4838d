//! OpenAPI document served at `GET /api-docs/openapi.json`.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{
    ai_templates, analytics, auth, billing, credentials, executions, export_templates,
    notifications, organization, system, templates, workflows,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "PumpFlix API", description = "Multi-tenant workflow automation"),
    paths(
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        organization::get_organization,
        organization::update_organization,
        organization::list_events,
        organization::list_tenants,
        organization::create_tenant,
        organization::list_users,
        organization::create_user,
        organization::update_user,
        organization::deactivate_user,
        workflows::list_workflows,
        workflows::create_workflow,
        workflows::get_workflow,
        workflows::update_workflow,
        workflows::delete_workflow,
        workflows::archive_workflow,
        workflows::unarchive_workflow,
        workflows::validate_workflow,
        workflows::execute_workflow,
        workflows::list_workflow_executions,
        executions::list_executions,
        executions::get_execution,
        executions::cancel_execution,
        templates::list_templates,
        templates::create_template,
        templates::get_template,
        templates::update_template,
        templates::delete_template,
        templates::instantiate_template,
        templates::list_instances,
        ai_templates::list_ai_templates,
        ai_templates::create_ai_template,
        ai_templates::get_ai_template,
        ai_templates::delete_ai_template,
        ai_templates::promote_ai_template,
        credentials::list_credentials,
        credentials::create_credential,
        credentials::get_credential,
        credentials::update_credential,
        credentials::delete_credential,
        billing::list_plans,
        billing::get_subscription,
        billing::create_checkout,
        billing::change_plan,
        billing::cancel_subscription,
        billing::get_usage,
        billing::webhook,
        export_templates::list_export_templates,
        export_templates::create_export_template,
        export_templates::get_export_template,
        export_templates::update_export_template,
        export_templates::delete_export_template,
        export_templates::archive_export_template,
        export_templates::list_versions,
        export_templates::get_version,
        export_templates::compare_versions,
        export_templates::run_export,
        export_templates::list_runs,
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read,
        analytics::usage,
        system::metrics,
        system::ws_sessions,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, login and token refresh"),
        (name = "organization", description = "Organization, tenants and users"),
        (name = "workflows", description = "Workflow definitions and executions"),
        (name = "executions", description = "Execution logs"),
        (name = "templates", description = "Reusable workflow templates"),
        (name = "ai-templates", description = "AI-generated workflow drafts"),
        (name = "credentials", description = "Encrypted integration credentials"),
        (name = "billing", description = "Plans, subscriptions and provider webhooks"),
        (name = "export-templates", description = "Versioned export schemas and runs"),
        (name = "notifications", description = "In-app notifications"),
        (name = "analytics", description = "Usage statistics"),
        (name = "system", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` JWT scheme referenced by `security(("bearer" = []))`.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/workflows/{id}/execute"));
        assert!(doc.paths.paths.contains_key("/api/v1/export-templates/{id}/compare"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
