//! JWT access tokens and opaque refresh tokens.
//!
//! Access tokens are HS256-signed and carry the user's organization, tenant
//! and role so that handlers can scope queries without a user lookup.
//! Refresh tokens are random strings; only their SHA-256 digest is stored.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pumpflix_core::hashing::sha256_hex;
use pumpflix_core::types::DbId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::parsed_var;

/// Claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id.
    pub sub: DbId,
    pub org_id: DbId,
    pub tenant_id: DbId,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// The identity an access token is issued for.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub role: &'a str,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_mins: i64,
    pub refresh_token_expiry_days: i64,
}

impl JwtConfig {
    /// `JWT_SECRET` (required), `JWT_ACCESS_EXPIRY_MINS` (15) and
    /// `JWT_REFRESH_EXPIRY_DAYS` (7).
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        assert!(!secret.trim().is_empty(), "JWT_SECRET must be set");
        Self {
            secret,
            access_token_expiry_mins: parsed_var("JWT_ACCESS_EXPIRY_MINS", 15),
            refresh_token_expiry_days: parsed_var("JWT_REFRESH_EXPIRY_DAYS", 7),
        }
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_expiry_days)
    }
}

/// Issue an HS256 access token for `subject`.
pub fn generate_access_token(
    subject: TokenSubject<'_>,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();

    let claims = Claims {
        sub: subject.user_id,
        org_id: subject.organization_id,
        tenant_id: subject.tenant_id,
        role: subject.role.to_string(),
        exp: now + config.access_token_expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate signature and expiry, returning the embedded [`Claims`].
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Returns `(plaintext, sha256_hex)`. Only the hash is persisted.
pub fn generate_refresh_token() -> (String, String) {
    let plaintext = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let hash = hash_refresh_token(&plaintext);
    (plaintext, hash)
}

pub fn hash_refresh_token(token: &str) -> String {
    sha256_hex(token.as_bytes())
}
