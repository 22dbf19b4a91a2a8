use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName,
    },
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bow_mcp_gateway::{
    collaborators::{NoSessionResolver, SqliteOrganizationStore, StaticMcpToolRegistry},
    config::Config,
    db,
    handlers::{discovery_handlers, mcp_handlers, oauth_handlers},
    mcp::gateway::McpGateway,
    repositories::{
        SqliteAccessTokenRepository, SqliteAuthorizationCodeRepository, SqliteClientRepository,
    },
    services::{AuthDispatcher, OAuthService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bow_mcp_gateway=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config.validate_production();

    let pool = db::create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

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

    // The real session-cookie login system lives outside this core
    // (§1); NoSessionResolver means a standalone deployment of this
    // binary authenticates MCP and client-registry calls via API key or
    // OAuth bearer only, until wired against the actual login system.
    let auth_dispatcher = Arc::new(AuthDispatcher::new(
        Arc::new(NoSessionResolver),
        organization_store.clone(),
        organization_store.clone(),
        oauth_service.clone(),
        organization_store,
    ));

    let mcp_gateway = Arc::new(McpGateway::new(
        Arc::new(StaticMcpToolRegistry::default()),
        "bow-mcp-gateway",
    ));

    let app_state = AppState {
        config: Arc::new(config),
        auth_dispatcher,
        oauth_service,
        mcp_gateway,
        pool,
    };

    // MCP clients send `Authorization` and `mcp-protocol-version`;
    // neither is covered by a wildcard allow-headers list.
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("mcp-protocol-version"),
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
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
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()?;
    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));

    tracing::info!(%addr, "bow-mcp-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
