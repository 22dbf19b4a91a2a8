//! MCP JSON-RPC endpoint (§4.9, §4.10): authenticates via the
//! precedence-ordered dispatcher, then hands off to the gateway.
//! Every response — success or error — carries `MCP-Protocol-Version`.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::CookieJar;

use crate::error::McpAuthError;
use crate::http_util::{request_host, request_scheme};
use crate::mcp::gateway::{self, PROTOCOL_VERSION};
use crate::models::{ExternalOrganization, ExternalUser};
use crate::AppState;

const API_KEY_HEADER: &str = "x-api-key";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

fn with_protocol_version_header(mut response: Response) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static(PROTOCOL_VERSION_HEADER),
        HeaderValue::from_static(PROTOCOL_VERSION),
    );
    response
}

async fn authenticate(
    state: &AppState,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<(ExternalUser, ExternalOrganization), McpAuthError> {
    let session_token = jar.get("session_token").map(|c| c.value().to_string());
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let base = state
        .config
        .resolve_base_url(request_scheme(headers), &request_host(headers));
    let resource_metadata_url = format!("{base}/.well-known/oauth-protected-resource");

    let resolved = state
        .auth_dispatcher
        .authenticate(session_token.as_deref(), api_key.as_deref(), bearer.as_deref())
        .await
        .ok_or(McpAuthError::Unauthenticated {
            resource_metadata_url,
        })?;

    if !state.auth_dispatcher.mcp_enabled(&resolved.1).await {
        return Err(McpAuthError::Forbidden);
    }

    Ok(resolved)
}

/// `GET /api/mcp` — a static server-info payload, no JSON-RPC envelope.
pub async fn mcp_info(State(state): State<AppState>) -> Response {
    with_protocol_version_header(Json(state.mcp_gateway.server_info_payload()).into_response())
}

/// `POST /api/mcp` — the JSON-RPC entry point.
pub async fn mcp_rpc(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (user, organization) = match authenticate(&state, &jar, &headers).await {
        Ok(pair) => pair,
        Err(err) => return with_protocol_version_header(err.into_response()),
    };

    let response = match gateway::parse_request(&body) {
        Ok(request) => state.mcp_gateway.dispatch(request, &user, &organization).await,
        Err(envelope) => envelope,
    };

    with_protocol_version_header(Json(response).into_response())
}

/// `GET /api/mcp/tools` — debug REST view of the tool registry, bypassing
/// the JSON-RPC envelope entirely.
pub async fn mcp_tools_debug(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let (_, _organization) = match authenticate(&state, &jar, &headers).await {
        Ok(pair) => pair,
        Err(err) => return with_protocol_version_header(err.into_response()),
    };

    let tools = state.mcp_gateway.list_tools().await;
    with_protocol_version_header(Json(serde_json::json!({ "tools": tools })).into_response())
}
