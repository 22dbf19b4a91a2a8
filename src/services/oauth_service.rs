//! Orchestration of client validation, authorization-code issuance and
//! exchange, token refresh, and bearer validation (§4.2-§4.5).
//!
//! This is deliberately the only place that knows the *order* in which
//! checks run. Repositories only know how to read/write one table;
//! handlers only know how to shape HTTP. Everything in between — "all
//! of these must hold, in this order, or it's a generic `invalid_grant`"
//! — lives here.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::collaborators::DomainLookup;
use crate::crypto::{
    self, ACCESS_TOKEN_PREFIX, CLIENT_ID_PREFIX, CLIENT_SECRET_PREFIX, REFRESH_TOKEN_PREFIX,
};
use crate::error::OAuthError;
use crate::models::{ExternalOrganization, ExternalUser, OAuthClient};
use crate::repositories::{AccessTokenRepository, AuthorizationCodeRepository, ClientRepository};

pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::hours(1);
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(30);
pub const AUTHORIZATION_CODE_LIFETIME: Duration = Duration::minutes(5);

/// Redirect URIs assigned to a client created without an explicit list.
pub const DEFAULT_REDIRECT_URIS: &[&str] = &[
    "https://claude.ai/api/mcp/auth_callback",
    "https://claude.com/api/mcp/auth_callback",
    "http://localhost:6274/oauth/callback",
    "http://localhost:6274/oauth/callback/debug",
];

#[derive(Debug, Serialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientPublicInfo {
    pub client_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ClientRotation {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

pub struct OAuthService {
    clients: Arc<dyn ClientRepository>,
    codes: Arc<dyn AuthorizationCodeRepository>,
    tokens: Arc<dyn AccessTokenRepository>,
    domain: Arc<dyn DomainLookup>,
}

impl OAuthService {
    pub fn new(
        clients: Arc<dyn ClientRepository>,
        codes: Arc<dyn AuthorizationCodeRepository>,
        tokens: Arc<dyn AccessTokenRepository>,
        domain: Arc<dyn DomainLookup>,
    ) -> Self {
        Self {
            clients,
            codes,
            tokens,
            domain,
        }
    }

    // ---------------------------------------------------------------
    // §4.2 Client registry
    // ---------------------------------------------------------------

    pub async fn create_client(
        &self,
        organization_id: &str,
        name: &str,
        redirect_uris: Option<Vec<String>>,
    ) -> Result<ClientRegistration, OAuthError> {
        let redirect_uris = redirect_uris.unwrap_or_else(|| {
            DEFAULT_REDIRECT_URIS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });
        let redirect_uris_json = serde_json::to_string(&redirect_uris)
            .map_err(|e| OAuthError::InvalidRequest(e.to_string()))?;

        // the public client_id is never hashed for lookup, only the secret is
        let (client_id, _) = crypto::generate_token(CLIENT_ID_PREFIX);
        let (client_secret, client_secret_hash) = crypto::generate_token(CLIENT_SECRET_PREFIX);

        self.clients
            .create(
                organization_id,
                &client_id,
                &client_secret_hash,
                name,
                &redirect_uris_json,
                "mcp",
            )
            .await
            .map_err(client_repo_err)?;

        debug!(client_id = %client_id, organization_id, "created OAuth client");

        Ok(ClientRegistration {
            client_id,
            client_secret,
            name: name.to_string(),
            redirect_uris,
        })
    }

    pub async fn list_clients(&self, organization_id: &str) -> Result<Vec<OAuthClient>, OAuthError> {
        self.clients
            .list_live_by_organization(organization_id)
            .await
            .map_err(client_repo_err)
    }

    pub async fn get_public_info(&self, client_id: &str) -> Result<ClientPublicInfo, OAuthError> {
        let client = self
            .clients
            .find_live_by_client_id(client_id)
            .await
            .map_err(client_repo_err)?
            .ok_or(OAuthError::NotFound)?;

        Ok(ClientPublicInfo {
            client_id: client.client_id,
            name: client.name,
        })
    }

    pub async fn delete_client(&self, id: i64, organization_id: &str) -> Result<bool, OAuthError> {
        self.clients
            .soft_delete(id, organization_id)
            .await
            .map_err(client_repo_err)
    }

    pub async fn rotate_client(
        &self,
        id: i64,
        organization_id: &str,
    ) -> Result<ClientRotation, OAuthError> {
        let (client_secret, client_secret_hash) = crypto::generate_token(CLIENT_SECRET_PREFIX);

        let client = self
            .clients
            .rotate_secret(id, organization_id, &client_secret_hash)
            .await
            .map_err(client_repo_err)?
            .ok_or(OAuthError::NotFound)?;

        Ok(ClientRotation {
            client_id: client.client_id,
            client_secret,
        })
    }

    /// Returns the live client iff it matches `client_id` and, when
    /// `client_secret` is provided, its hash. A public client request
    /// (no secret supplied) is validated without a secret check.
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Option<OAuthClient>, OAuthError> {
        let Some(client) = self
            .clients
            .find_live_by_client_id(client_id)
            .await
            .map_err(client_repo_err)?
        else {
            return Ok(None);
        };

        if let Some(secret) = client_secret {
            let hash = crypto::hash(secret);
            if !crypto::hashes_equal(&hash, &client.client_secret_hash) {
                return Ok(None);
            }
        }

        Ok(Some(client))
    }

    pub fn validate_redirect_uri(&self, client: &OAuthClient, redirect_uri: &str) -> bool {
        client
            .redirect_uri_list()
            .iter()
            .any(|uri| uri == redirect_uri)
    }

    // ---------------------------------------------------------------
    // §4.3 Authorization-code flow
    // ---------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_authorization_code(
        &self,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        redirect_uri: &str,
        scope: &str,
        code_challenge: &str,
    ) -> Result<String, OAuthError> {
        let (code, _) = crypto::generate_token("");
        let expires_at = Utc::now() + AUTHORIZATION_CODE_LIFETIME;

        self.codes
            .create(
                &code,
                client_id,
                user_id,
                organization_id,
                redirect_uri,
                scope,
                code_challenge,
                expires_at,
            )
            .await
            .map_err(code_repo_err)?;

        Ok(code)
    }

    /// Exchanges a single-use authorization code for a token pair.
    /// Every failure path returns the same generic `InvalidGrant` so the
    /// caller cannot distinguish "wrong client" from "expired code" from
    /// "bad PKCE" (§7: no oracle).
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        client_secret: Option<&str>,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        // 1. validate(client_id, client_secret)
        let client = self
            .validate_client(client_id, client_secret)
            .await?
            .ok_or(OAuthError::InvalidGrant)?;

        // 2. live record for `code` bound to `client_id`
        let record = self
            .codes
            .find_live_by_code_and_client(code, client_id)
            .await
            .map_err(code_repo_err)?
            .ok_or(OAuthError::InvalidGrant)?;

        // 3. now < expires_at, else tombstone and fail
        let now = Utc::now();
        if record.is_expired(now) {
            let _ = self.codes.tombstone(code).await;
            return Err(OAuthError::InvalidGrant);
        }

        // 4. PKCE S256 check
        if !crypto::verify_pkce_s256(code_verifier, &record.code_challenge) {
            return Err(OAuthError::InvalidGrant);
        }

        // 5. stored redirect_uri equals request redirect_uri byte-for-byte
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant);
        }

        // All checks passed: atomically consume the code. If another
        // request won the race since step 2's read, this loses and gets
        // invalid_grant rather than a second token pair.
        let consumed = self.codes.tombstone(code).await.map_err(code_repo_err)?;
        if !consumed {
            return Err(OAuthError::InvalidGrant);
        }

        self.mint_token_pair(
            &client.client_id,
            &record.user_id,
            &record.organization_id,
            &record.scope,
        )
        .await
    }

    // ---------------------------------------------------------------
    // §4.4 Token exchange & refresh
    // ---------------------------------------------------------------

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        // 1. validate client
        let client = self
            .validate_client(client_id, client_secret)
            .await?
            .ok_or(OAuthError::InvalidGrant)?;

        // 2. live record matching refresh hash + client
        let refresh_hash = crypto::hash(refresh_token);
        let record = self
            .tokens
            .find_live_by_refresh_hash_and_client(&refresh_hash, client_id)
            .await
            .map_err(token_repo_err)?
            .ok_or(OAuthError::InvalidGrant)?;

        // 3. refresh_expires_at > now
        let now = Utc::now();
        if !record.is_refresh_token_valid(now) {
            return Err(OAuthError::InvalidGrant);
        }

        // 4. tombstone the old record (access + refresh rotate together)
        let rotated = self.tokens.tombstone(record.id).await.map_err(token_repo_err)?;
        if !rotated {
            return Err(OAuthError::InvalidGrant);
        }

        // 5. mint a new pair tied to the same user/org/scope, never a
        // wider scope than the original consent.
        self.mint_token_pair(
            &client.client_id,
            &record.user_id,
            &record.organization_id,
            &record.scope,
        )
        .await
    }

    async fn mint_token_pair(
        &self,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        scope: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let (access_token, access_hash) = crypto::generate_token(ACCESS_TOKEN_PREFIX);
        let (refresh_token, refresh_hash) = crypto::generate_token(REFRESH_TOKEN_PREFIX);
        let now = Utc::now();
        let access_expires_at = now + ACCESS_TOKEN_LIFETIME;
        let refresh_expires_at = now + REFRESH_TOKEN_LIFETIME;

        self.tokens
            .create(
                &access_hash,
                client_id,
                user_id,
                organization_id,
                scope,
                access_expires_at,
                Some(&refresh_hash),
                Some(refresh_expires_at),
            )
            .await
            .map_err(token_repo_err)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: ACCESS_TOKEN_LIFETIME.num_seconds(),
            refresh_token,
            scope: scope.to_string(),
        })
    }

    // ---------------------------------------------------------------
    // §4.5 Bearer validation
    // ---------------------------------------------------------------

    /// Validates an MCP access token. Short-circuits on prefix mismatch
    /// to avoid collateral lookups against unrelated credential schemes.
    pub async fn validate_access_token(
        &self,
        plaintext: &str,
    ) -> Option<(ExternalUser, ExternalOrganization)> {
        if !plaintext.starts_with(ACCESS_TOKEN_PREFIX) {
            return None;
        }

        let hash = crypto::hash(plaintext);
        let record = self.tokens.find_live_by_token_hash(&hash).await.ok().flatten()?;

        let now = Utc::now();
        if !record.is_access_token_valid(now) {
            return None;
        }

        let user = self.domain.get_user(&record.user_id).await?;
        let organization = self.domain.get_organization(&record.organization_id).await?;

        Some((user, organization))
    }
}

// The repository crates each define their own `RepositoryError` (one per
// table, matching the narrow per-repository trait boundary); these
// helpers fold it into a single `OAuthError::Database` regardless of
// which repository failed, or surface `AlreadyExists` as a conflict.
fn client_repo_err(e: crate::repositories::client_repository::RepositoryError) -> OAuthError {
    use crate::repositories::client_repository::RepositoryError;
    match e {
        RepositoryError::Database(e) => OAuthError::Database(e),
        RepositoryError::AlreadyExists => OAuthError::InvalidRequest("client already exists".into()),
    }
}

fn code_repo_err(e: crate::repositories::code_repository::RepositoryError) -> OAuthError {
    use crate::repositories::code_repository::RepositoryError;
    match e {
        RepositoryError::Database(e) => OAuthError::Database(e),
    }
}

fn token_repo_err(e: crate::repositories::token_repository::RepositoryError) -> OAuthError {
    use crate::repositories::token_repository::RepositoryError;
    match e {
        RepositoryError::Database(e) => OAuthError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockDomainLookup;
    use crate::models::AuthorizationCode;
    use crate::repositories::client_repository::MockClientRepository;
    use crate::repositories::code_repository::MockAuthorizationCodeRepository;
    use crate::repositories::token_repository::MockAccessTokenRepository;

    fn test_client(secret_hash: &str) -> OAuthClient {
        OAuthClient {
            id: 1,
            organization_id: "org-1".into(),
            client_id: "bow_client_abc".into(),
            client_secret_hash: secret_hash.to_string(),
            name: "Claude Web".into(),
            redirect_uris: serde_json::to_string(&vec!["https://claude.ai/callback"]).unwrap(),
            scopes: "mcp".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn exchange_code_fails_closed_on_client_mismatch() {
        let mut clients = MockClientRepository::new();
        clients
            .expect_find_live_by_client_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        let codes = MockAuthorizationCodeRepository::new();
        let tokens = MockAccessTokenRepository::new();
        let domain = MockDomainLookup::new();

        let service = OAuthService::new(
            Arc::new(clients),
            Arc::new(codes),
            Arc::new(tokens),
            Arc::new(domain),
        );

        let result = service
            .exchange_code(
                "code_x",
                "bow_client_unknown",
                None,
                "verifier",
                "https://claude.ai/callback",
            )
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidGrant)));
    }

    #[tokio::test]
    async fn exchange_code_fails_closed_on_expired_code_and_tombstones_it() {
        let secret_hash = crypto::hash("s");
        let mut clients = MockClientRepository::new();
        let client = test_client(&secret_hash);
        clients.expect_find_live_by_client_id().returning(move |_| {
            let c = client.clone();
            Box::pin(async move { Ok(Some(c)) })
        });

        let mut codes = MockAuthorizationCodeRepository::new();
        codes.expect_find_live_by_code_and_client().returning(|_, _| {
            Box::pin(async {
                Ok(Some(AuthorizationCode {
                    id: 1,
                    code: "code_x".into(),
                    client_id: "bow_client_abc".into(),
                    user_id: "user-1".into(),
                    organization_id: "org-1".into(),
                    redirect_uri: "https://claude.ai/callback".into(),
                    scope: "mcp".into(),
                    code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into(),
                    expires_at: Utc::now() - Duration::seconds(1),
                    created_at: "2026-01-01T00:00:00Z".into(),
                    deleted_at: None,
                }))
            })
        });
        codes.expect_tombstone().returning(|_| Box::pin(async { Ok(true) }));

        let tokens = MockAccessTokenRepository::new();
        let domain = MockDomainLookup::new();

        let service = OAuthService::new(
            Arc::new(clients),
            Arc::new(codes),
            Arc::new(tokens),
            Arc::new(domain),
        );

        let result = service
            .exchange_code(
                "code_x",
                "bow_client_abc",
                None,
                "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
                "https://claude.ai/callback",
            )
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidGrant)));
    }

    #[test]
    fn validate_redirect_uri_is_exact_match_only() {
        let client = test_client("hash");
        let list = client.redirect_uri_list();
        assert!(list.contains(&"https://claude.ai/callback".to_string()));
        assert!(!list.contains(&"https://evil.example.com/callback".to_string()));
    }
}
