//! Test-only helpers for building a migrated in-memory database and a
//! fully wired [`AppState`]/[`axum::Router`], shared by unit tests in
//! this crate and the integration tests under `tests/`.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::SqlitePool;

use async_trait::async_trait;

use crate::collaborators::{SessionResolver, SqliteOrganizationStore, StaticMcpToolRegistry};
use crate::models::ExternalUser;
use crate::config::Config;
use crate::handlers::{discovery_handlers, mcp_handlers, oauth_handlers};
use crate::mcp::gateway::McpGateway;
use crate::repositories::{
    SqliteAccessTokenRepository, SqliteAuthorizationCodeRepository, SqliteClientRepository,
};
use crate::services::{AuthDispatcher, OAuthService};
use crate::AppState;

/// An in-memory database migrated with this crate's schema.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations against test db");
    pool
}

/// Inserts a live organization row.
pub async fn insert_organization(pool: &SqlitePool, id: &str, mcp_enabled: bool) {
    sqlx::query!(
        "INSERT INTO organizations (id, name, mcp_enabled) VALUES (?, ?, ?)",
        id,
        id,
        mcp_enabled,
    )
    .execute(pool)
    .await
    .expect("failed to insert test organization");
}

/// Inserts a live user row belonging to `organization_id`.
pub async fn insert_user(pool: &SqlitePool, id: &str, organization_id: &str) {
    let email = format!("{id}@example.com");
    sqlx::query!(
        "INSERT INTO users (id, email, organization_id) VALUES (?, ?, ?)",
        id,
        email,
        organization_id,
    )
    .execute(pool)
    .await
    .expect("failed to insert test user");
}

/// Test-only stand-in for the real session-cookie login system: treats
/// the session token as a user id directly, rather than doing the real
/// cookie->session->user lookup the out-of-scope login system owns.
/// Lets integration tests authenticate the consent POST and client
/// registry endpoints by setting `session_token=<user id>`.
struct TestSessionResolver {
    pool: SqlitePool,
}

#[async_trait]
impl SessionResolver for TestSessionResolver {
    async fn resolve_user(&self, session_token: &str) -> Option<ExternalUser> {
        sqlx::query_as!(
            ExternalUser,
            "SELECT id, email FROM users WHERE id = ?",
            session_token
        )
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
    }
}

/// An `AppState` wired against `pool`: real OAuth repositories, the
/// Sqlite-backed collaborator stand-ins from [`crate::collaborators`],
/// and the single-tool static MCP registry. `public_base_url` lets
/// callers pin discovery output instead of deriving it from request
/// headers.
pub async fn build_test_app_state(pool: SqlitePool, public_base_url: Option<&str>) -> AppState {
    let clients = Arc::new(SqliteClientRepository::new(pool.clone()));
    let codes = Arc::new(SqliteAuthorizationCodeRepository::new(pool.clone()));
    let tokens = Arc::new(SqliteAccessTokenRepository::new(pool.clone()));
    let organization_store = Arc::new(SqliteOrganizationStore::new(pool.clone()));

    let oauth_service = Arc::new(OAuthService::new(
        clients,
        codes,
        tokens,
        organization_store.clone(),
    ));

    let auth_dispatcher = Arc::new(AuthDispatcher::new(
        Arc::new(TestSessionResolver { pool: pool.clone() }),
        organization_store.clone(),
        organization_store.clone(),
        oauth_service.clone(),
        organization_store,
    ));

    let mcp_gateway = Arc::new(McpGateway::new(
        Arc::new(StaticMcpToolRegistry::default()),
        "bow-mcp-gateway",
    ));

    let mut config = Config::from_env();
    config.public_base_url = public_base_url.map(|s| s.to_string());

    AppState {
        config: Arc::new(config),
        auth_dispatcher,
        oauth_service,
        mcp_gateway,
        pool,
    }
}

/// The full router this crate serves, wired against `state`.
pub fn build_test_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(discovery_handlers::protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(discovery_handlers::authorization_server_metadata),
        )
        .route("/authorize", get(oauth_handlers::authorize_redirect))
        .route(
            "/api/oauth/authorize",
            get(oauth_handlers::authorize_redirect).post(oauth_handlers::consent_authorize),
        )
        .route("/api/oauth/token", post(oauth_handlers::token))
        .route(
            "/api/oauth/clients",
            get(oauth_handlers::list_clients).post(oauth_handlers::create_client),
        )
        .route(
            "/api/oauth/clients/{client_id}/info",
            get(oauth_handlers::client_public_info),
        )
        .route("/api/oauth/clients/{id}", delete(oauth_handlers::delete_client))
        .route(
            "/api/oauth/clients/{id}/rotate",
            post(oauth_handlers::rotate_client),
        )
        .route(
            "/api/mcp",
            get(mcp_handlers::mcp_info).post(mcp_handlers::mcp_rpc),
        )
        .route("/api/mcp/tools", get(mcp_handlers::mcp_tools_debug))
        .with_state(state)
}
