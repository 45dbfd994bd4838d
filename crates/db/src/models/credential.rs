//! Integration credential model. The encrypted secret never leaves the
//! repository layer in serialized form.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use pumpflix_core::types::{DbId, Timestamp};

/// A row from the `credentials` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Credential {
    pub id: DbId,
    pub organization_id: DbId,
    pub tenant_id: DbId,
    pub provider: String,
    pub name: String,
    #[serde(skip)]
    pub encrypted_secret: Vec<u8>,
    #[serde(skip)]
    pub nonce: Vec<u8>,
    pub secret_hint: String,
    pub metadata: serde_json::Value,
    pub created_by: Option<DbId>,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/credentials`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCredential {
    pub provider: String,
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// DTO for `PUT /api/v1/credentials/{id}`. A new `secret` re-encrypts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCredential {
    pub name: Option<String>,
    pub secret: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Encrypted form of a secret ready for storage.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub hint: String,
}
