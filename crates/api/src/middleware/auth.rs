//! Bearer-token authentication.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use pumpflix_core::error::CoreError;
use pumpflix_core::types::DbId;

use crate::auth::jwt::{validate_token, Claims, JwtConfig};
use crate::error::AppError;
use crate::state::AppState;

/// The caller behind a valid access token.
///
/// Handlers scope every tenant query by `organization_id` from here. Ids in
/// request bodies or paths are never trusted to pick the tenant.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub role: String,
}

impl AuthUser {
    /// Validate an access token and unpack its claims.
    pub fn from_token(token: &str, jwt: &JwtConfig) -> Result<Self, AppError> {
        validate_token(token, jwt)
            .map(Self::from)
            .map_err(|_| unauthorized("Invalid or expired token"))
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            organization_id: claims.org_id,
            tenant_id: claims.tenant_id,
            role: claims.role,
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        Self::from_token(token, &state.config.jwt)
    }
}

/// The token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("Authorization header is not valid text"))?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(unauthorized("Expected an Authorization header of the form 'Bearer <token>'")),
    }
}

fn unauthorized(message: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_rejected() {
        assert_matches!(
            bearer_token(&headers("Basic dXNlcjpwdw==")),
            Err(AppError::Core(CoreError::Unauthorized(_)))
        );
        assert_matches!(
            bearer_token(&headers("Bearer  ")),
            Err(AppError::Core(CoreError::Unauthorized(_)))
        );
        assert_matches!(
            bearer_token(&HeaderMap::new()),
            Err(AppError::Core(CoreError::Unauthorized(_)))
        );
    }
}
