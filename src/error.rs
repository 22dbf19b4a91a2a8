//! HTTP-facing error taxonomy for the OAuth core and MCP auth dispatcher.
//!
//! JSON-RPC level errors (`-32700`/`-32600`/`-32601`/`-32602`) are not
//! modeled here: they're embedded in a 200 OK JSON-RPC envelope rather
//! than surfaced as HTTP errors, and are built directly in
//! `crate::mcp::gateway`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors from client registry and authorization-code/token orchestration.
///
/// Every variant maps to one of the kinds in the error taxonomy; in
/// particular `InvalidGrant` is deliberately generic and used for *any*
/// code/PKCE/redirect/refresh failure so the response never discloses
/// which check failed.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unsupported_response_type")]
    UnsupportedResponseType,

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_grant")]
    InvalidGrant,

    #[error("unsupported_grant_type")]
    UnsupportedGrantType,

    #[error("redirect_uri not in client's allowlist")]
    InvalidRedirectUri,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let (status, error, description) = match &self {
            OAuthError::UnsupportedResponseType => (
                StatusCode::BAD_REQUEST,
                "unsupported_response_type",
                self.to_string(),
            ),
            OAuthError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            OAuthError::InvalidGrant => (
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "the provided authorization grant is invalid, expired, or was already used"
                    .to_string(),
            ),
            OAuthError::UnsupportedGrantType => (
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                self.to_string(),
            ),
            OAuthError::InvalidRedirectUri => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "redirect_uri is not registered for this client".to_string(),
            ),
            OAuthError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            OAuthError::Database(e) => {
                tracing::error!(error = %e, "database error in OAuth core");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({"error": error, "error_description": description})),
        )
            .into_response()
    }
}

/// Failure to authenticate an MCP request across all three schemes in
/// the dispatcher precedence chain, or a successfully-authenticated
/// request whose organization lacks the MCP feature flag.
#[derive(Debug, Error)]
pub enum McpAuthError {
    #[error("not authenticated")]
    Unauthenticated { resource_metadata_url: String },

    #[error("MCP integration is not enabled for this organization")]
    Forbidden,
}

impl IntoResponse for McpAuthError {
    fn into_response(self) -> Response {
        match self {
            McpAuthError::Unauthenticated {
                resource_metadata_url,
            } => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"})))
                        .into_response();
                if let Ok(value) = HeaderValue::from_str(&format!(
                    r#"Bearer resource_metadata="{resource_metadata_url}""#
                )) {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                }
                response
            }
            McpAuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "MCP integration is not enabled for this organization"})),
            )
                .into_response(),
        }
    }
}
