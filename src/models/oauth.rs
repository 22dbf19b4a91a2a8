//! Row types for the three persisted OAuth entities (§3 of the design).
//!
//! These are plain data, `FromRow`-mapped straight off the `oauth_*`
//! tables. Business logic (validation, mutation, tombstoning) lives in
//! the repository traits (`crate::repositories`) and orchestration
//! service (`crate::services::oauth_service`), not on these structs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: i64,
    pub organization_id: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret_hash: String,
    pub name: String,
    /// JSON-encoded array of absolute redirect URIs.
    pub redirect_uris: String,
    pub scopes: String,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl OAuthClient {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn redirect_uri_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: i64,
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// PKCE S256 challenge, base64url without padding.
    pub code_challenge: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl AuthorizationCode {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub id: i64,
    pub token_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub scope: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub refresh_token_hash: Option<String>,
    pub refresh_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl AccessTokenRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_access_token_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.is_live() && self.expires_at > now
    }

    pub fn is_refresh_token_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.refresh_expires_at {
            Some(exp) => self.is_live() && exp > now,
            None => false,
        }
    }
}
