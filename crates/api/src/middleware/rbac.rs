//! Role gates layered on top of [`AuthUser`].
//!
//! A caller whose role ranks too low gets 403; a missing or bad token is
//! still 401 from the inner extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use pumpflix_core::error::CoreError;
use pumpflix_core::roles::{can_edit, can_manage};

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Owners and admins: membership, billing and organization settings.
pub struct RequireAdmin(pub AuthUser);

/// Members and above. Viewers only read.
pub struct RequireEditor(pub AuthUser);

async fn authorize(
    parts: &mut Parts,
    state: &AppState,
    allowed: fn(&str) -> bool,
    denial: &str,
) -> Result<AuthUser, AppError> {
    let user = AuthUser::from_request_parts(parts, state).await?;
    if allowed(&user.role) {
        Ok(user)
    } else {
        tracing::debug!(user_id = user.user_id, role = %user.role, "Role check denied");
        Err(AppError::Core(CoreError::Forbidden(denial.to_string())))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authorize(parts, state, can_manage, "Admin role required").await.map(Self)
    }
}

impl FromRequestParts<AppState> for RequireEditor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authorize(parts, state, can_edit, "Member role or higher required").await.map(Self)
    }
}
