//! Handlers for the `/auth` resource (register, login, refresh, logout, me).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use pumpflix_core::error::CoreError;
use pumpflix_core::naming::{slugify, validate_slug};
use pumpflix_core::types::DbId;
use pumpflix_db::models::organization::Registration;
use pumpflix_db::models::session::CreateSession;
use pumpflix_db::models::user::{User, UserResponse};
use pumpflix_db::repositories::{SessionRepo, UserRepo};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::jwt::{
    generate_access_token, generate_refresh_token, hash_refresh_token, TokenSubject,
};
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Consecutive bad passwords that lock an account for `LOCK_DURATION_MINS`.
const MAX_FAILED_ATTEMPTS: i32 = 5;
const LOCK_DURATION_MINS: i64 = 15;

const MAX_USER_AGENT_LENGTH: usize = 512;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub organization_name: String,
    /// Derived from the organization name when omitted.
    pub organization_slug: Option<String>,
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by register, login and refresh.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfo {
    #[schema(value_type = i64)]
    pub id: DbId,
    #[schema(value_type = i64)]
    pub organization_id: DbId,
    #[schema(value_type = i64)]
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            organization_id: u.organization_id,
            tenant_id: u.tenant_id,
            email: u.email.clone(),
            display_name: u.display_name.clone(),
            role: u.role.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an organization with its default tenant, an owner account and a
/// free trial subscription, then sign the owner in.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Organization created", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email or slug already taken"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let organization_name = input.organization_name.trim();
    if organization_name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Organization name must not be empty".into(),
        )));
    }
    let slug = match input.organization_slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => slugify(organization_name),
    };
    validate_slug(&slug)?;

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

    let registered = pumpflix_db::repositories::OrganizationRepo::register(
        &state.pool,
        &Registration {
            organization_name: organization_name.to_string(),
            organization_slug: slug,
            email,
            display_name: display_name.to_string(),
            password_hash,
        },
    )
    .await?;

    tracing::info!(
        organization_id = registered.organization.id,
        user_id = registered.user_id,
        "Organization registered"
    );

    let user = UserRepo::find_by_id(&state.pool, registered.user_id)
        .await?
        .ok_or_else(|| AppError::InternalError("Registered user vanished".into()))?;
    let response = create_auth_response(&state, &user, user_agent(&headers)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad credentials"),
        (status = 403, description = "Account deactivated or locked"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let invalid = || {
        AppError::Core(CoreError::Unauthorized(
            "Invalid email or password".into(),
        ))
    };

    let user = UserRepo::find_by_email(&state.pool, &input.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }

    if let Some(locked_until) = user.locked_until {
        if locked_until > Utc::now() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Account is temporarily locked. Try again later.".into(),
            )));
        }
    }

    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        let lock_until = Utc::now() + chrono::Duration::minutes(LOCK_DURATION_MINS);
        if let Some(until) =
            UserRepo::record_failed_login(&state.pool, user.id, MAX_FAILED_ATTEMPTS, lock_until)
                .await?
        {
            tracing::warn!(user_id = user.id, %until, "Account locked after repeated failed logins");
        }
        return Err(invalid());
    }

    UserRepo::record_successful_login(&state.pool, user.id).await?;

    let response = create_auth_response(&state, &user, user_agent(&headers)).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/refresh
///
/// Rotate a refresh token: the presented session is revoked and a new one
/// issued.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = AuthResponse),
        (status = 401, description = "Unknown, expired or revoked refresh token"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token_hash = hash_refresh_token(&input.refresh_token);

    let session = SessionRepo::consume(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid or expired refresh token".into(),
            ))
        })?;

    let user = UserRepo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;

    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }

    let response = create_auth_response(&state, &user, user_agent(&headers)).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/logout
///
/// Revoke every session of the caller.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    security(("bearer" = [])),
    responses((status = 204, description = "Sessions revoked"))
)]
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<StatusCode> {
    let revoked = SessionRepo::revoke_for_user(&state.pool, auth_user.user_id).await?;
    tracing::debug!(user_id = auth_user.user_id, revoked, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Not signed in"),
    )
)]
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = UserRepo::find_in_organization(&state.pool, auth_user.organization_id, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", auth_user.user_id))?;
    Ok(Json(DataResponse { data: user.into() }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase and sanity-check an email address.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.len() > 254 || email.contains(char::is_whitespace) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "'{}' is not a valid email address",
            raw.trim()
        ))));
    }
    Ok(email)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(MAX_USER_AGENT_LENGTH).collect())
}

/// Issue an access token, persist a refresh session, build the response.
async fn create_auth_response(
    state: &AppState,
    user: &User,
    user_agent: Option<String>,
) -> AppResult<AuthResponse> {
    let access_token = generate_access_token(
        TokenSubject {
            user_id: user.id,
            organization_id: user.organization_id,
            tenant_id: user.tenant_id,
            role: &user.role,
        },
        &state.config.jwt,
    )
    .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let (refresh_plaintext, refresh_hash) = generate_refresh_token();
    let expires_at = Utc::now() + state.config.jwt.refresh_ttl();

    SessionRepo::open(
        &state.pool,
        &CreateSession {
            user_id: user.id,
            refresh_token_hash: refresh_hash,
            expires_at,
            user_agent,
        },
    )
    .await?;

    Ok(AuthResponse {
        access_token,
        refresh_token: refresh_plaintext,
        expires_in: state.config.jwt.access_token_expiry_mins * 60,
        user: UserInfo::from(user),
    })
}
