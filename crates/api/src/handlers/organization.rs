//! Handlers for the caller's organization, its tenants and its users.
//!
//! Everything here requires `admin` or `owner`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::error::CoreError;
use pumpflix_core::naming::{slugify, validate_slug};
use pumpflix_core::pagination::{clamp_limit, DEFAULT_LIMIT, MAX_LIMIT};
use pumpflix_core::roles::{can_assign, ROLE_MEMBER, ROLE_OWNER};
use pumpflix_core::types::DbId;
use pumpflix_db::models::event::Event;
use pumpflix_db::models::organization::{CreateTenant, Organization, Tenant, UpdateOrganization};
use pumpflix_db::models::user::{CreateUser, UpdateUser, UserResponse};
use pumpflix_db::repositories::{
    EventRepo, OrganizationRepo, SessionRepo, TenantRepo, UserRepo,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::password::{hash_password, validate_password_strength};
use crate::error::{AppError, AppResult};
use crate::handlers::auth::normalize_email;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /users`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
    /// Defaults to `member`.
    pub role: Option<String>,
    /// Defaults to the caller's tenant.
    #[schema(value_type = Option<i64>)]
    pub tenant_id: Option<DbId>,
}

/// GET /api/v1/org
#[utoipa::path(get, path = "/api/v1/org", tag = "organization", security(("bearer" = [])),
    responses((status = 200, description = "The caller's organization")))]
pub async fn get_organization(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Organization>>> {
    let org = OrganizationRepo::find_by_id(&state.pool, user.organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", user.organization_id))?;
    Ok(Json(DataResponse { data: org }))
}

/// PUT /api/v1/org
#[utoipa::path(put, path = "/api/v1/org", tag = "organization", security(("bearer" = [])),
    responses((status = 200, description = "Organization updated")))]
pub async fn update_organization(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<UpdateOrganization>,
) -> AppResult<Json<DataResponse<Organization>>> {
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Core(CoreError::Validation(
            "Organization name must not be empty".into(),
        )));
    }
    let org = OrganizationRepo::update(&state.pool, user.organization_id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", user.organization_id))?;
    Ok(Json(DataResponse { data: org }))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/org/events
///
/// The organization's audit trail, newest first.
#[utoipa::path(get, path = "/api/v1/org/events", tag = "organization", security(("bearer" = [])),
    params(("limit" = Option<i64>, Query, description = "At most 100, default 50")),
    responses((status = 200, description = "Recent platform events")))]
pub async fn list_events(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<DataResponse<Vec<Event>>>> {
    let limit = clamp_limit(query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let events = EventRepo::list_for_organization(&state.pool, user.organization_id, limit).await?;
    Ok(Json(DataResponse { data: events }))
}

/// GET /api/v1/tenants
#[utoipa::path(get, path = "/api/v1/tenants", tag = "organization", security(("bearer" = [])),
    responses((status = 200, description = "Tenants of the organization")))]
pub async fn list_tenants(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Tenant>>>> {
    let tenants = TenantRepo::list_by_organization(&state.pool, user.organization_id).await?;
    Ok(Json(DataResponse { data: tenants }))
}

/// POST /api/v1/tenants
#[utoipa::path(post, path = "/api/v1/tenants", tag = "organization", security(("bearer" = [])),
    responses(
        (status = 201, description = "Tenant created"),
        (status = 409, description = "Slug already used in this organization"),
    ))]
pub async fn create_tenant(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateTenant>,
) -> AppResult<(StatusCode, Json<DataResponse<Tenant>>)> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Tenant name must not be empty".into(),
        )));
    }
    let slug = input
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(name));
    validate_slug(&slug)?;

    let tenant = TenantRepo::create(&state.pool, user.organization_id, name, &slug).await?;
    tracing::info!(tenant_id = tenant.id, organization_id = user.organization_id, "Tenant created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: tenant })))
}

/// GET /api/v1/users
#[utoipa::path(get, path = "/api/v1/users", tag = "organization", security(("bearer" = [])),
    responses((status = 200, description = "Users of the organization")))]
pub async fn list_users(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<UserResponse>>>> {
    let users = UserRepo::list_by_organization(&state.pool, user.organization_id).await?;
    Ok(Json(DataResponse {
        data: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// POST /api/v1/users
#[utoipa::path(post, path = "/api/v1/users", tag = "organization", security(("bearer" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created"),
        (status = 403, description = "Role above the caller's"),
        (status = 409, description = "Email already registered"),
    ))]
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<UserResponse>>)> {
    let role = input.role.as_deref().unwrap_or(ROLE_MEMBER);
    ensure_assignable(&admin.role, role)?;

    let tenant_id = input.tenant_id.unwrap_or(admin.tenant_id);
    ensure_tenant(&state, admin.organization_id, tenant_id).await?;

    let email = normalize_email(&input.email)?;
    let display_name = input.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Display name must not be empty".into(),
        )));
    }
    validate_password_strength(&input.password)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;
    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    let created = UserRepo::create(
        &state.pool,
        &CreateUser {
            organization_id: admin.organization_id,
            tenant_id,
            email,
            display_name: display_name.to_string(),
            password_hash,
            role: role.to_string(),
        },
    )
    .await?;

    tracing::info!(user_id = created.id, created_by = admin.user_id, role, "User created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: created.into() })))
}

/// PUT /api/v1/users/{id}
#[utoipa::path(put, path = "/api/v1/users/{id}", tag = "organization", security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "No such user in the organization"),
    ))]
pub async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateUser>,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let target = UserRepo::find_in_organization(&state.pool, admin.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;

    if let Some(role) = input.role.as_deref() {
        if target.id == admin.user_id && role != target.role {
            return Err(AppError::Core(CoreError::Forbidden(
                "You cannot change your own role".into(),
            )));
        }
        ensure_assignable(&admin.role, role)?;
        if target.role == ROLE_OWNER && admin.role != ROLE_OWNER {
            return Err(AppError::Core(CoreError::Forbidden(
                "Only an owner can change another owner".into(),
            )));
        }
    }
    if let Some(tenant_id) = input.tenant_id {
        ensure_tenant(&state, admin.organization_id, tenant_id).await?;
    }
    if input.display_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Core(CoreError::Validation(
            "Display name must not be empty".into(),
        )));
    }

    let updated = UserRepo::update(&state.pool, admin.organization_id, id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;
    Ok(Json(DataResponse { data: updated.into() }))
}

/// POST /api/v1/users/{id}/deactivate
///
/// Deactivates the account and revokes all of its sessions.
#[utoipa::path(post, path = "/api/v1/users/{id}/deactivate", tag = "organization",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 404, description = "No such active user in the organization"),
    ))]
pub async fn deactivate_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if id == admin.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "You cannot deactivate your own account".into(),
        )));
    }
    let target = UserRepo::find_in_organization(&state.pool, admin.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;
    if target.role == ROLE_OWNER && admin.role != ROLE_OWNER {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only an owner can deactivate another owner".into(),
        )));
    }

    if !UserRepo::deactivate(&state.pool, admin.organization_id, id).await? {
        return Err(AppError::not_found("User", id));
    }
    SessionRepo::revoke_for_user(&state.pool, id).await?;
    tracing::info!(user_id = id, deactivated_by = admin.user_id, "User deactivated");
    Ok(StatusCode::NO_CONTENT)
}

fn ensure_assignable(actor_role: &str, role: &str) -> AppResult<()> {
    if !pumpflix_core::roles::is_valid_role(role) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unknown role '{role}'"
        ))));
    }
    if !can_assign(actor_role, role) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "A {actor_role} cannot assign the {role} role"
        ))));
    }
    Ok(())
}

async fn ensure_tenant(state: &AppState, organization_id: DbId, tenant_id: DbId) -> AppResult<()> {
    TenantRepo::find_by_id(&state.pool, organization_id, tenant_id)
        .await?
        .ok_or_else(|| AppError::not_found("Tenant", tenant_id))?;
    Ok(())
}
