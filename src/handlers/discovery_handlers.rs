//! RFC 9728 protected-resource metadata and RFC 8414 authorization-server
//! metadata (§4.6). Both are unauthenticated GETs consumed by MCP clients
//! before they ever talk to this server.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::http_util::{request_host, request_scheme};
use crate::AppState;

pub async fn protected_resource_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base = state
        .config
        .resolve_base_url(request_scheme(&headers), &request_host(&headers));

    Json(json!({
        "resource": format!("{base}/api/mcp"),
        "authorization_servers": [base],
        "scopes_supported": ["mcp", "claudeai"],
    }))
}

pub async fn authorization_server_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base = state
        .config
        .resolve_base_url(request_scheme(&headers), &request_host(&headers));

    Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/api/oauth/token"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["client_secret_post", "none"],
        "scopes_supported": ["mcp", "claudeai"],
    }))
}
