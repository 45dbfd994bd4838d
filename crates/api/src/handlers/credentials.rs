//! Handlers for the `/credentials` resource.
//!
//! Secrets are encrypted before they reach the repository and are never
//! serialized back; responses only carry `secret_hint`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pumpflix_core::crypto::secret_hint;
use pumpflix_core::error::CoreError;
use pumpflix_core::plans::LimitKind;
use pumpflix_core::types::DbId;
use pumpflix_core::workflow::CREDENTIAL_PROVIDERS;
use pumpflix_db::models::credential::{
    CreateCredential, Credential, SealedSecret, UpdateCredential,
};
use pumpflix_db::repositories::CredentialRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::limits::enforce_limit;
use crate::middleware::rbac::RequireEditor;
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_CREDENTIAL_NAME_LENGTH: usize = 120;

#[derive(Debug, Default, Deserialize)]
pub struct CredentialListParams {
    pub provider: Option<String>,
}

/// GET /api/v1/credentials
#[utoipa::path(get, path = "/api/v1/credentials", tag = "credentials", security(("bearer" = [])),
    params(("provider" = Option<String>, Query, description = "Filter by provider")),
    responses((status = 200, description = "Credentials without their secrets")))]
pub async fn list_credentials(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CredentialListParams>,
) -> AppResult<Json<DataResponse<Vec<Credential>>>> {
    let items =
        CredentialRepo::list(&state.pool, auth.organization_id, params.provider.as_deref()).await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/credentials
#[utoipa::path(post, path = "/api/v1/credentials", tag = "credentials", security(("bearer" = [])),
    responses(
        (status = 201, description = "Credential stored"),
        (status = 403, description = "Credential limit reached"),
        (status = 409, description = "Name already used for this provider"),
    ))]
pub async fn create_credential(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Json(input): Json<CreateCredential>,
) -> AppResult<(StatusCode, Json<DataResponse<Credential>>)> {
    if !CREDENTIAL_PROVIDERS.contains(&input.provider.as_str()) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unknown provider '{}'. Supported: {}",
            input.provider,
            CREDENTIAL_PROVIDERS.join(", ")
        ))));
    }
    let name = validate_credential_name(&input.name)?;
    if input.secret.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Secret must not be empty".into(),
        )));
    }
    let metadata = validate_metadata(input.metadata)?;

    enforce_limit(&state.pool, auth.organization_id, LimitKind::Credentials).await?;

    let sealed = seal(&state, &input.secret)?;
    let credential = CredentialRepo::create(
        &state.pool,
        auth.organization_id,
        auth.tenant_id,
        auth.user_id,
        &input.provider,
        name,
        &sealed,
        &metadata,
    )
    .await?;

    tracing::info!(
        credential_id = credential.id,
        provider = %credential.provider,
        user_id = auth.user_id,
        "Credential stored"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: credential })))
}

/// GET /api/v1/credentials/{id}
#[utoipa::path(get, path = "/api/v1/credentials/{id}", tag = "credentials", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Credential id")),
    responses((status = 200, description = "The credential without its secret"), (status = 404, description = "Not found")))]
pub async fn get_credential(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Credential>>> {
    let credential = CredentialRepo::find_by_id(&state.pool, auth.organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Credential", id))?;
    Ok(Json(DataResponse { data: credential }))
}

/// PUT /api/v1/credentials/{id}
///
/// A new `secret` is re-encrypted with a fresh nonce.
#[utoipa::path(put, path = "/api/v1/credentials/{id}", tag = "credentials", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Credential id")),
    responses((status = 200, description = "Credential updated"), (status = 404, description = "Not found")))]
pub async fn update_credential(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateCredential>,
) -> AppResult<Json<DataResponse<Credential>>> {
    let name = input.name.as_deref().map(validate_credential_name).transpose()?;
    let sealed = match input.secret.as_deref() {
        Some("") => {
            return Err(AppError::Core(CoreError::Validation(
                "Secret must not be empty".into(),
            )))
        }
        Some(secret) => Some(seal(&state, secret)?),
        None => None,
    };
    let metadata = match input.metadata {
        Some(m) => Some(validate_metadata(Some(m))?),
        None => None,
    };

    let credential = CredentialRepo::update(
        &state.pool,
        auth.organization_id,
        id,
        name,
        sealed.as_ref(),
        metadata.as_ref(),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Credential", id))?;
    Ok(Json(DataResponse { data: credential }))
}

/// DELETE /api/v1/credentials/{id}
#[utoipa::path(delete, path = "/api/v1/credentials/{id}", tag = "credentials", security(("bearer" = [])),
    params(("id" = i64, Path, description = "Credential id")),
    responses((status = 204, description = "Credential deleted"), (status = 404, description = "Not found")))]
pub async fn delete_credential(
    RequireEditor(auth): RequireEditor,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !CredentialRepo::delete(&state.pool, auth.organization_id, id).await? {
        return Err(AppError::not_found("Credential", id));
    }
    tracing::info!(credential_id = id, user_id = auth.user_id, "Credential deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn seal(state: &AppState, secret: &str) -> AppResult<SealedSecret> {
    let (ciphertext, nonce) = state.cipher.encrypt(secret)?;
    Ok(SealedSecret {
        ciphertext,
        nonce,
        hint: secret_hint(secret),
    })
}

fn validate_credential_name(name: &str) -> AppResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_CREDENTIAL_NAME_LENGTH {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Credential name must be 1-{MAX_CREDENTIAL_NAME_LENGTH} characters"
        ))));
    }
    Ok(trimmed)
}

fn validate_metadata(metadata: Option<serde_json::Value>) -> AppResult<serde_json::Value> {
    match metadata {
        None | Some(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Some(v @ serde_json::Value::Object(_)) => Ok(v),
        Some(_) => Err(AppError::Core(CoreError::Validation(
            "Metadata must be an object".into(),
        ))),
    }
}
